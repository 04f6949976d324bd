//! Public filesystem facade.
//!
//! `Filesystem` is the crate's single entry point: everything a caller does
//! — `open`, `read`, `mkdir`, `rename`, `readdir`, streaming — goes through
//! one of its methods. Internally it composes the pieces built so far: the
//! [`crate::resolver`] to turn a path into an inode, the
//! [`crate::inode::InodeManager`] to act on that inode, and the
//! [`crate::fd::FdTable`] to track what's currently open.

pub mod checks;
pub mod cwd;
pub mod extra;
pub mod ops;

pub use checks::Access;

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::RwLock;

use crate::config::{FsOptions, Identity};
use crate::error::FsResult;
use crate::fd::FdTable;
use crate::inode::InodeManager;
use crate::kv::KvStore;
use crate::param::ROOT_INO;

/// A mounted filesystem. Cheap to clone — clones share the same underlying
/// store, descriptor table and current-directory state, the way a forked
/// process shares its parent's open file table until it diverges.
///
/// `chroot` is the one exception: it builds a *sibling* facade with its own,
/// independent `cwd`/`root`, registered in `chroots` so that `stop` on the
/// parent cascades to every facade it chrooted off.
#[derive(Clone, Debug)]
pub struct Filesystem {
    pub(crate) inodes: InodeManager,
    pub(crate) fds: Arc<FdTable>,
    pub(crate) cwd: Arc<RwLock<u64>>,
    pub(crate) root: Arc<RwLock<u64>>,
    pub(crate) chroots: Arc<StdMutex<Vec<Filesystem>>>,
    pub(crate) umask: u32,
    pub(crate) identity: Identity,
}

impl Filesystem {
    /// Mounts (creating on first use) the encrypted store described by
    /// `options` and returns a facade rooted at `/`.
    pub async fn mount(options: FsOptions) -> FsResult<Self> {
        let umask = options.umask;
        let identity = options.identity;
        let store = KvStore::open(&options)?;
        let inodes = InodeManager::new(store, options.block_size as usize);
        inodes.bootstrap(0o777).await?;

        tracing::info!(path = %options.db_path.display(), "filesystem mounted");

        Ok(Self {
            inodes,
            fds: Arc::new(FdTable::new()),
            cwd: Arc::new(RwLock::new(ROOT_INO)),
            root: Arc::new(RwLock::new(ROOT_INO)),
            chroots: Arc::new(StdMutex::new(Vec::new())),
            umask,
            identity,
        })
    }

    pub fn inodes(&self) -> &InodeManager {
        &self.inodes
    }

    /// Returns a handle to the same mounted store acting as a different
    /// caller identity, leaving the current working directory unchanged.
    pub fn as_identity(&self, identity: Identity) -> Self {
        Self {
            identity,
            ..self.clone()
        }
    }

    /// Tears down this facade and, recursively, every facade it chrooted
    /// off. Chrooted descendants are drained from `chroots` as they're
    /// stopped, so calling this twice is harmless.
    pub async fn stop(&self) {
        let children = {
            let mut chroots = self.chroots.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *chroots)
        };
        for child in children {
            Box::pin(child.stop()).await;
        }
    }
}
