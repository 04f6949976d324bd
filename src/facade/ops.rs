//! POSIX-ish filesystem operations.

use super::checks::{check_permission, Access};
use super::Filesystem;
use crate::error::{fs_err, ErrorKind, FsResult};
use crate::fcntl::OFlags;
use crate::path::FsPath;
use crate::resolver;
use crate::stat::{InodeKind, Stat};
use crate::stream::{ReadStream, WriteStream};

impl Filesystem {
    pub(crate) async fn require_write_access(&self, dir_ino: u64) -> FsResult<()> {
        let stat = self.inodes.stat(dir_ino).await?;
        check_permission(self.identity, &stat, Access::WRITE)
    }

    /// Opens (and, per `mode`, optionally creates) `path`, returning a file
    /// descriptor. Mirrors the teacher's `create()` race-resolution loop:
    /// under concurrent `open(O_CREAT)` calls for the same name, exactly one
    /// caller creates the inode and every other caller opens what that
    /// caller created, rather than racing on a bare exists-check.
    pub async fn open(&self, path: &str, mode: &str) -> FsResult<u32> {
        let flags = OFlags::parse(mode)?;
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;

        let ino = if flags.wants_create() {
            let parent = resolver::resolve_parent(&self.inodes, root, cwd, path, self.identity).await?;
            let (ino, _created) = self
                .inodes
                .create_child(
                    parent.parent_ino,
                    &parent.name,
                    InodeKind::File,
                    0o666 & !self.umask,
                    0,
                    0,
                    flags.wants_exclusive(),
                    None,
                )
                .await
                .map_err(|e| e.with_syscall("open").with_path(path))?;
            ino
        } else {
            let follow = !flags.wants_nofollow();
            let navigated = resolver::resolve(&self.inodes, root, cwd, path, follow, self.identity)
                .await
                .map_err(|e| e.with_syscall("open").with_path(path))?;
            navigated.ino
        };

        let stat = self.inodes.stat(ino).await?;
        if flags.wants_nofollow() && stat.kind == InodeKind::Symlink {
            return Err(fs_err!(ErrorKind::SymlinkLoop, "open").with_path(path));
        }
        if flags.wants_directory() && stat.kind != InodeKind::Directory {
            return Err(fs_err!(ErrorKind::NotDirectory, "open").with_path(path));
        }
        if stat.kind == InodeKind::Directory && flags.wants_write() {
            return Err(fs_err!(ErrorKind::IsDirectory, "open").with_path(path));
        }

        let mut wanted = Access::empty();
        if flags.wants_read() {
            wanted |= Access::READ;
        }
        if flags.wants_write() {
            wanted |= Access::WRITE;
        }
        check_permission(self.identity, &stat, wanted)
            .map_err(|e| e.with_syscall("open").with_path(path))?;

        if flags.contains(OFlags::TRUNCATE) && stat.kind == InodeKind::File {
            self.inodes.truncate(ino, 0).await?;
        }

        let fd = self.fds.open(ino, flags).await;
        if flags.contains(OFlags::APPEND) {
            let stat = self.inodes.stat(ino).await?;
            let handle = self.fds.get(fd).await?;
            handle.lock().await.position = stat.size;
        }
        Ok(fd)
    }

    pub async fn close(&self, fd: u32) -> FsResult<()> {
        let (ino, was_last) = self.fds.close(fd).await?;
        if was_last {
            self.inodes.finalize_if_orphaned(ino).await?;
        }
        Ok(())
    }

    pub async fn dup(&self, fd: u32) -> FsResult<u32> {
        self.fds.dup(fd).await
    }

    pub async fn read(&self, fd: u32, len: usize) -> FsResult<Vec<u8>> {
        let handle = self.fds.get(fd).await?;
        let mut open_file = handle.lock().await;
        if !open_file.flags.wants_read() {
            return Err(fs_err!(ErrorKind::BadFd, "read"));
        }
        let data = self
            .inodes
            .read_range(open_file.ino, open_file.position, len as u64)
            .await?;
        open_file.position += data.len() as u64;
        Ok(data)
    }

    pub async fn write(&self, fd: u32, data: &[u8]) -> FsResult<u64> {
        let handle = self.fds.get(fd).await?;
        let mut open_file = handle.lock().await;
        if !open_file.flags.wants_write() {
            return Err(fs_err!(ErrorKind::BadFd, "write"));
        }
        if open_file.flags.contains(OFlags::APPEND) {
            let stat = self.inodes.stat(open_file.ino).await?;
            open_file.position = open_file.position.max(stat.size);
        }
        let written = self
            .inodes
            .write_range(open_file.ino, open_file.position, data)
            .await?;
        open_file.position += written;
        Ok(written)
    }

    /// Convenience wrapper: `open(path, "w")`, write the whole buffer, `close`.
    pub async fn write_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let fd = self.open(path, "w").await?;
        let result = self.write(fd, data).await;
        self.close(fd).await?;
        result.map(|_| ())
    }

    /// Convenience wrapper: `open(path, "r")`, read to end, `close`.
    pub async fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let fd = self.open(path, "r").await?;
        let stat = self.fstat(fd).await?;
        let result = self.read(fd, stat.size as usize).await;
        self.close(fd).await?;
        result
    }

    /// `true` if `path` resolves to an existing entry.
    pub async fn exists(&self, path: &str) -> bool {
        self.access(path, Access::empty()).await.is_ok()
    }

    pub async fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let parent = resolver::resolve_parent(&self.inodes, root, cwd, path, self.identity).await?;
        self.require_write_access(parent.parent_ino)
            .await
            .map_err(|e| e.with_syscall("mkdir").with_path(path))?;
        self.inodes
            .create_child(
                parent.parent_ino,
                &parent.name,
                InodeKind::Directory,
                mode & !self.umask,
                0,
                0,
                true,
                None,
            )
            .await
            .map_err(|e| e.with_syscall("mkdir").with_path(path))?;
        Ok(())
    }

    /// Like `mkdir`, but creates any missing ancestor directories too and
    /// treats an already-existing target directory as success, mirroring
    /// `std::fs::create_dir_all`.
    pub async fn mkdir_all(&self, path: &str, mode: u32) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let fs_path = FsPath::new(path).map_err(|e| e.with_syscall("mkdir").with_path(path))?;
        let mut dir_ino = if fs_path.is_absolute() { root } else { cwd };

        let mut rest = fs_path;
        while let Some((name, tail)) = rest
            .skip_elem()
            .map_err(|e| e.with_syscall("mkdir").with_path(path))?
        {
            match name.as_str() {
                "." => {}
                ".." => {
                    dir_ino = self
                        .inodes
                        .lookup(dir_ino, "..")
                        .await
                        .map_err(|e| e.with_syscall("mkdir").with_path(path))?
                        .map(|(ino, _)| ino)
                        .unwrap_or(dir_ino);
                }
                component => {
                    self.require_write_access(dir_ino)
                        .await
                        .map_err(|e| e.with_syscall("mkdir").with_path(path))?;
                    let (ino, _created) = self
                        .inodes
                        .create_child(
                            dir_ino,
                            component,
                            InodeKind::Directory,
                            mode & !self.umask,
                            0,
                            0,
                            false,
                            None,
                        )
                        .await
                        .map_err(|e| e.with_syscall("mkdir").with_path(path))?;
                    let stat = self.inodes.stat(ino).await?;
                    if stat.kind != InodeKind::Directory {
                        return Err(fs_err!(ErrorKind::NotDirectory, "mkdir").with_path(path));
                    }
                    dir_ino = ino;
                }
            }
            rest = tail;
        }
        Ok(())
    }

    pub async fn mknod(&self, path: &str, mode: u32, rdev: u64) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let parent = resolver::resolve_parent(&self.inodes, root, cwd, path, self.identity).await?;
        self.require_write_access(parent.parent_ino)
            .await
            .map_err(|e| e.with_syscall("mknod").with_path(path))?;
        let (ino, created) = self
            .inodes
            .create_child(
                parent.parent_ino,
                &parent.name,
                InodeKind::Device,
                mode,
                0,
                0,
                true,
                None,
            )
            .await
            .map_err(|e| e.with_syscall("mknod").with_path(path))?;
        if created {
            self.inodes.set_rdev(ino, rdev).await?;
        }
        Ok(())
    }

    pub async fn symlink(&self, target: &str, link_path: &str) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let parent = resolver::resolve_parent(&self.inodes, root, cwd, link_path, self.identity).await?;
        self.require_write_access(parent.parent_ino)
            .await
            .map_err(|e| e.with_syscall("symlink").with_path(link_path))?;
        self.inodes
            .create_child(
                parent.parent_ino,
                &parent.name,
                InodeKind::Symlink,
                0o777,
                0,
                0,
                true,
                Some(target),
            )
            .await
            .map_err(|e| e.with_syscall("symlink").with_path(link_path))?;
        Ok(())
    }

    pub async fn readlink(&self, path: &str) -> FsResult<String> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, false, self.identity)
            .await
            .map_err(|e| e.with_syscall("readlink").with_path(path))?;
        if navigated.kind != InodeKind::Symlink {
            return Err(fs_err!(ErrorKind::InvalidArgument, "readlink").with_path(path));
        }
        self.inodes.read_symlink(navigated.ino).await
    }

    pub async fn link(&self, existing: &str, new_path: &str) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let target = resolver::resolve(&self.inodes, root, cwd, existing, false, self.identity)
            .await
            .map_err(|e| e.with_syscall("link").with_path(existing))?;
        let parent = resolver::resolve_parent(&self.inodes, root, cwd, new_path, self.identity).await?;
        self.require_write_access(parent.parent_ino)
            .await
            .map_err(|e| e.with_syscall("link").with_path(new_path))?;
        self.inodes
            .link(parent.parent_ino, &parent.name, target.ino)
            .await
            .map_err(|e| e.with_syscall("link").with_path(existing).with_dest(new_path))
    }

    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let parent = resolver::resolve_parent(&self.inodes, root, cwd, path, self.identity).await?;
        let (ino, kind) = self
            .inodes
            .lookup(parent.parent_ino, &parent.name)
            .await?
            .ok_or_else(|| fs_err!(ErrorKind::NoEntry, "unlink").with_path(path))?;
        if kind == InodeKind::Directory {
            return Err(fs_err!(ErrorKind::IsDirectory, "unlink").with_path(path));
        }
        self.require_write_access(parent.parent_ino)
            .await
            .map_err(|e| e.with_syscall("unlink").with_path(path))?;
        let is_open = self.fds.is_open(ino).await;
        self.inodes
            .unlink(parent.parent_ino, &parent.name, is_open)
            .await
            .map_err(|e| e.with_syscall("unlink").with_path(path))
    }

    pub async fn rmdir(&self, path: &str) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let parent = resolver::resolve_parent(&self.inodes, root, cwd, path, self.identity).await?;
        let (ino, kind) = self
            .inodes
            .lookup(parent.parent_ino, &parent.name)
            .await?
            .ok_or_else(|| fs_err!(ErrorKind::NoEntry, "rmdir").with_path(path))?;
        if kind != InodeKind::Directory {
            return Err(fs_err!(ErrorKind::NotDirectory, "rmdir").with_path(path));
        }
        self.require_write_access(parent.parent_ino)
            .await
            .map_err(|e| e.with_syscall("rmdir").with_path(path))?;
        let is_open = self.fds.is_open(ino).await;
        self.inodes
            .unlink(parent.parent_ino, &parent.name, is_open)
            .await
            .map_err(|e| e.with_syscall("rmdir").with_path(path))
    }

    /// Like `rmdir`, but first recursively empties `path` instead of failing
    /// with `ENOTEMPTY`, mirroring `std::fs::remove_dir_all`. The directory's
    /// own inode lock is held for the whole drain (see
    /// [`crate::inode::InodeManager::hold_inode_lock`]), so the nested
    /// `unlink` calls it makes against entries inside itself must — and do —
    /// re-acquire that same lock from the same task without deadlocking.
    pub async fn rmdir_all(&self, path: &str) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, false, self.identity)
            .await
            .map_err(|e| e.with_syscall("rmdir").with_path(path))?;
        if navigated.kind != InodeKind::Directory {
            return Err(fs_err!(ErrorKind::NotDirectory, "rmdir").with_path(path));
        }
        self.drain_directory(navigated.ino)
            .await
            .map_err(|e| e.with_syscall("rmdir").with_path(path))?;

        let parent = resolver::resolve_parent(&self.inodes, root, cwd, path, self.identity).await?;
        self.require_write_access(parent.parent_ino)
            .await
            .map_err(|e| e.with_syscall("rmdir").with_path(path))?;
        let is_open = self.fds.is_open(navigated.ino).await;
        self.inodes
            .unlink(parent.parent_ino, &parent.name, is_open)
            .await
            .map_err(|e| e.with_syscall("rmdir").with_path(path))
    }

    async fn drain_directory(&self, dir_ino: u64) -> FsResult<()> {
        let _lock = self.inodes.hold_inode_lock(dir_ino).await;
        self.require_write_access(dir_ino).await?;
        for entry in self.inodes.readdir(dir_ino).await? {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            if entry.kind == InodeKind::Directory {
                Box::pin(self.drain_directory(entry.ino)).await?;
            }
            let is_open = self.fds.is_open(entry.ino).await;
            self.inodes.unlink(dir_ino, &entry.name, is_open).await?;
        }
        Ok(())
    }

    pub async fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let old_parent = resolver::resolve_parent(&self.inodes, root, cwd, old_path, self.identity)
            .await
            .map_err(|e| e.with_syscall("rename").with_path(old_path))?;
        let new_parent = resolver::resolve_parent(&self.inodes, root, cwd, new_path, self.identity)
            .await
            .map_err(|e| e.with_syscall("rename").with_path(new_path))?;

        if matches!(old_parent.name.as_str(), "." | "..") || matches!(new_parent.name.as_str(), "." | "..") {
            return Err(fs_err!(ErrorKind::NotPermitted, "rename")
                .with_path(old_path)
                .with_dest(new_path));
        }

        self.require_write_access(old_parent.parent_ino)
            .await
            .map_err(|e| e.with_syscall("rename").with_path(old_path))?;
        self.require_write_access(new_parent.parent_ino)
            .await
            .map_err(|e| e.with_syscall("rename").with_path(new_path))?;

        self.inodes
            .rename(
                old_parent.parent_ino,
                &old_parent.name,
                new_parent.parent_ino,
                &new_parent.name,
            )
            .await
            .map_err(|e| e.with_syscall("rename").with_path(old_path).with_dest(new_path))
    }

    pub async fn stat(&self, path: &str) -> FsResult<Stat> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity)
            .await
            .map_err(|e| e.with_syscall("stat").with_path(path))?;
        self.inodes.stat(navigated.ino).await
    }

    pub async fn lstat(&self, path: &str) -> FsResult<Stat> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, false, self.identity)
            .await
            .map_err(|e| e.with_syscall("lstat").with_path(path))?;
        self.inodes.stat(navigated.ino).await
    }

    pub async fn fstat(&self, fd: u32) -> FsResult<Stat> {
        let handle = self.fds.get(fd).await?;
        let ino = handle.lock().await.ino;
        self.inodes.stat(ino).await
    }

    pub async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity).await?;
        self.inodes.set_mode(navigated.ino, mode).await
    }

    pub async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity).await?;
        self.inodes.set_owner(navigated.ino, uid, gid).await
    }

    pub async fn utimes(&self, path: &str, atime: i64, mtime: i64) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity).await?;
        self.inodes.set_times(navigated.ino, atime, mtime).await
    }

    pub async fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity).await?;
        self.inodes.truncate(navigated.ino, size).await
    }

    pub async fn ftruncate(&self, fd: u32, size: u64) -> FsResult<()> {
        let handle = self.fds.get(fd).await?;
        let ino = handle.lock().await.ino;
        self.inodes.truncate(ino, size).await
    }

    /// Checks whether `path` exists and the current identity holds every bit
    /// in `mode` (pass [`Access::empty`] to only test existence).
    pub async fn access(&self, path: &str, mode: Access) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity)
            .await
            .map_err(|e| e.with_syscall("access").with_path(path))?;
        let stat = self.inodes.stat(navigated.ino).await?;
        check_permission(self.identity, &stat, mode)
            .map_err(|e| e.with_syscall("access").with_path(path))
    }

    pub async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity)
            .await
            .map_err(|e| e.with_syscall("readdir").with_path(path))?;
        let entries = self.inodes.readdir(navigated.ino).await?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    /// Opens a bounded read stream over `path`'s contents.
    pub async fn open_read_stream(
        &self,
        path: &str,
        start: u64,
        end: Option<u64>,
    ) -> FsResult<ReadStream> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity).await?;
        ReadStream::new(self.inodes.clone(), navigated.ino, start, end).await
    }

    /// Opens a write stream over `path`'s contents, starting at `start`.
    pub async fn open_write_stream(&self, path: &str, start: u64) -> FsResult<WriteStream> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity).await?;
        Ok(WriteStream::new(self.inodes.clone(), navigated.ino, start))
    }
}
