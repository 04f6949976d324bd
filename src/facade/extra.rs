//! Operations layered on top of the core open/read/write/mkdir surface:
//! preallocation, recursive ownership changes, whole-file copy,
//! descriptor-relative metadata updates, explicit durability, link-aware
//! chmod/chown, temp-directory creation and seeking.

use rand::distributions::Alphanumeric;
use rand::Rng;

use super::Filesystem;
use crate::error::{fs_err, ErrorKind, FsResult};
use crate::fcntl::Whence;
use crate::param::MAX_FILE_SIZE;
use crate::resolver;
use crate::stat::InodeKind;

/// Random suffix length used by [`Filesystem::mkdtemp`].
const MKDTEMP_SUFFIX_LEN: usize = 6;
/// Collision-retry bound for [`Filesystem::mkdtemp`].
const MKDTEMP_ATTEMPTS: usize = 100;

impl Filesystem {
    /// Ensures `fd`'s file has storage for `[offset, offset + len)`, growing
    /// it (as a sparse hole, like `write`'s unwritten-block zero-fill) if
    /// necessary. Never shrinks.
    pub async fn fallocate(&self, fd: u32, offset: u64, len: u64) -> FsResult<()> {
        let handle = self.fds.get(fd).await?;
        let ino = handle.lock().await.ino;
        let target = offset
            .checked_add(len)
            .filter(|&size| size <= MAX_FILE_SIZE)
            .ok_or_else(|| fs_err!(ErrorKind::FileTooBig, "fallocate"))?;
        let stat = self.inodes.stat(ino).await?;
        if stat.kind != InodeKind::File {
            return Err(fs_err!(ErrorKind::IsDirectory, "fallocate"));
        }
        if target > stat.size {
            self.inodes.truncate(ino, target).await?;
        }
        Ok(())
    }

    /// Recursively applies `chown` to `path` and, if it's a directory, every
    /// entry beneath it.
    pub async fn chownr(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity)
            .await
            .map_err(|e| e.with_syscall("chownr").with_path(path))?;
        self.chown_recursive(navigated.ino, uid, gid)
            .await
            .map_err(|e| e.with_syscall("chownr").with_path(path))
    }

    async fn chown_recursive(&self, ino: u64, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        self.inodes.set_owner(ino, uid, gid).await?;
        let stat = self.inodes.stat(ino).await?;
        if stat.kind == InodeKind::Directory {
            for entry in self.inodes.readdir(ino).await? {
                if entry.name == "." || entry.name == ".." {
                    continue;
                }
                Box::pin(self.chown_recursive(entry.ino, uid, gid)).await?;
            }
        }
        Ok(())
    }

    /// Copies `src`'s contents to `dst`, creating or truncating `dst` as
    /// `write_file` would. Returns the number of bytes copied.
    pub async fn copy_file(&self, src: &str, dst: &str) -> FsResult<u64> {
        let data = self
            .read_file(src)
            .await
            .map_err(|e| e.with_syscall("copyFile").with_path(src))?;
        let len = data.len() as u64;
        self.write_file(dst, &data)
            .await
            .map_err(|e| e.with_syscall("copyFile").with_path(dst))?;
        Ok(len)
    }

    pub async fn fchmod(&self, fd: u32, mode: u32) -> FsResult<()> {
        let handle = self.fds.get(fd).await?;
        let ino = handle.lock().await.ino;
        self.inodes.set_mode(ino, mode).await
    }

    pub async fn fchown(&self, fd: u32, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        let handle = self.fds.get(fd).await?;
        let ino = handle.lock().await.ino;
        self.inodes.set_owner(ino, uid, gid).await
    }

    /// Flushes every buffered write to disk. There's no separate metadata
    /// journal to sync independently of the data it describes, so this is
    /// identical to `fsync`.
    pub async fn fdatasync(&self, fd: u32) -> FsResult<()> {
        let _ = self.fds.get(fd).await?;
        self.inodes.store().flush().await
    }

    pub async fn fsync(&self, fd: u32) -> FsResult<()> {
        let _ = self.fds.get(fd).await?;
        self.inodes.store().flush().await
    }

    pub async fn futimes(&self, fd: u32, atime: i64, mtime: i64) -> FsResult<()> {
        let handle = self.fds.get(fd).await?;
        let ino = handle.lock().await.ino;
        self.inodes.set_times(ino, atime, mtime).await
    }

    /// Like `chmod`, but operates on `path` itself rather than what it
    /// points to when `path` names a symlink.
    pub async fn lchmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, false, self.identity)
            .await
            .map_err(|e| e.with_syscall("lchmod").with_path(path))?;
        self.inodes.set_mode(navigated.ino, mode).await
    }

    /// Like `chown`, but operates on `path` itself rather than what it
    /// points to when `path` names a symlink.
    pub async fn lchown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, false, self.identity)
            .await
            .map_err(|e| e.with_syscall("lchown").with_path(path))?;
        self.inodes.set_owner(navigated.ino, uid, gid).await
    }

    /// Creates a new, uniquely-named directory under `prefix`'s parent,
    /// appending a random suffix the way `mkdtemp(3)` expands the trailing
    /// `XXXXXX` in its template. Returns the path actually created.
    pub async fn mkdtemp(&self, prefix: &str) -> FsResult<String> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let parent = resolver::resolve_parent(&self.inodes, root, cwd, prefix, self.identity)
            .await
            .map_err(|e| e.with_syscall("mkdtemp").with_path(prefix))?;
        self.require_write_access(parent.parent_ino)
            .await
            .map_err(|e| e.with_syscall("mkdtemp").with_path(prefix))?;

        for _ in 0..MKDTEMP_ATTEMPTS {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(MKDTEMP_SUFFIX_LEN)
                .map(char::from)
                .collect();
            let name = format!("{}{suffix}", parent.name);
            match self
                .inodes
                .create_child(
                    parent.parent_ino,
                    &name,
                    InodeKind::Directory,
                    0o700,
                    self.identity.uid,
                    self.identity.gid,
                    true,
                    None,
                )
                .await
            {
                Ok(_) => return Ok(format!("{prefix}{suffix}")),
                Err(e) if e.kind == ErrorKind::Exists => continue,
                Err(e) => return Err(e.with_syscall("mkdtemp").with_path(prefix)),
            }
        }
        Err(fs_err!(ErrorKind::Exists, "mkdtemp").with_path(prefix))
    }

    /// Repositions `fd`'s cursor relative to `whence`, returning the new
    /// absolute position. Rejects a resulting negative offset.
    pub async fn lseek(&self, fd: u32, offset: i64, whence: Whence) -> FsResult<u64> {
        let handle = self.fds.get(fd).await?;
        let mut open_file = handle.lock().await;
        let base: i128 = match whence {
            Whence::Start => 0,
            Whence::Current => open_file.position as i128,
            Whence::End => self.inodes.stat(open_file.ino).await?.size as i128,
        };
        let new_pos = base + offset as i128;
        if new_pos < 0 {
            return Err(fs_err!(ErrorKind::InvalidArgument, "lseek"));
        }
        let new_pos = new_pos as u64;
        open_file.position = new_pos;
        Ok(new_pos)
    }

    /// Convenience wrapper: `open(path, "a")`, write the whole buffer, `close`.
    pub async fn append_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let fd = self.open(path, "a").await?;
        let result = self.write(fd, data).await;
        self.close(fd).await?;
        result.map(|_| ())
    }
}
