//! Current-directory and root-directory state.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::Filesystem;
use crate::error::{fs_err, ErrorKind, FsResult};
use crate::resolver;
use crate::stat::InodeKind;

impl Filesystem {
    /// Changes the calling facade handle's current directory.
    pub async fn chdir(&self, path: &str) -> FsResult<()> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity)
            .await
            .map_err(|e| e.with_syscall("chdir").with_path(path))?;
        if navigated.kind != InodeKind::Directory {
            return Err(fs_err!(ErrorKind::NotDirectory, "chdir").with_path(path));
        }
        *self.cwd.write().await = navigated.ino;
        Ok(())
    }

    /// Restricts the returned facade handle to the subtree rooted at `path`.
    /// Unlike `chdir`, this doesn't mutate `self`: it builds a sibling
    /// [`Filesystem`] with its own independent `cwd`/`root`, so a caller that
    /// never touches the return value keeps seeing the full store, and two
    /// chroots of the same handle never see each other's `cwd`/`root`
    /// mutations. The sibling is registered under `self` so [`Self::stop`]
    /// cascades to it.
    pub async fn chroot(&self, path: &str) -> FsResult<Self> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity)
            .await
            .map_err(|e| e.with_syscall("chroot").with_path(path))?;
        if navigated.kind != InodeKind::Directory {
            return Err(fs_err!(ErrorKind::NotDirectory, "chroot").with_path(path));
        }
        let child = Self {
            inodes: self.inodes.clone(),
            fds: self.fds.clone(),
            cwd: Arc::new(RwLock::new(navigated.ino)),
            root: Arc::new(RwLock::new(navigated.ino)),
            chroots: Arc::new(std::sync::Mutex::new(Vec::new())),
            umask: self.umask,
            identity: self.identity,
        };
        self.chroots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(child.clone());
        Ok(child)
    }

    /// Resolves `path` to its canonical, symlink-free absolute form.
    pub async fn realpath(&self, path: &str) -> FsResult<String> {
        let cwd = self.current_dir_ino().await;
        let root = self.current_root_ino().await;
        let navigated = resolver::resolve(&self.inodes, root, cwd, path, true, self.identity)
            .await
            .map_err(|e| e.with_syscall("realpath").with_path(path))?;
        Ok(navigated.real_path)
    }

    pub(crate) async fn current_dir_ino(&self) -> u64 {
        *self.cwd.read().await
    }

    pub(crate) async fn current_root_ino(&self) -> u64 {
        *self.root.read().await
    }
}
