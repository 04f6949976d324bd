//! Mount-time configuration.

use std::path::{Path, PathBuf};

use crate::param::{DEFAULT_BLOCK_SIZE, DEFAULT_UMASK, MASTER_KEY_LEN};

/// The filesystem's master key. Never logged or displayed; [`fmt::Debug`]
/// deliberately redacts the bytes.
#[derive(Clone)]
pub struct MasterKey(pub(crate) [u8; MASTER_KEY_LEN]);

impl MasterKey {
    pub fn new(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; MASTER_KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MasterKey").field(&"<redacted>").finish()
    }
}

/// The caller's effective identity, used by [`crate::facade::checks::check_permission`].
/// `uid == 0` is root and bypasses all mode-bit checks, matching POSIX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    pub const ROOT: Identity = Identity { uid: 0, gid: 0 };

    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::ROOT
    }
}

/// Options accepted when opening (or creating) a [`crate::facade::Filesystem`].
#[derive(Debug, Clone)]
pub struct FsOptions {
    /// Directory backing the encrypted key-value store.
    pub db_path: PathBuf,
    /// 32-byte master key; every block's per-chunk key is derived from it.
    pub db_key: MasterKey,
    /// Logical file block size, in bytes.
    pub block_size: u32,
    /// Default permission mask applied to newly created files/directories.
    pub umask: u32,
    /// When `true`, wipe any pre-existing state in `db_path` before mounting.
    pub fresh: bool,
    /// Effective caller identity used for mode-bit permission checks.
    pub identity: Identity,
}

impl FsOptions {
    pub fn new(db_path: impl AsRef<Path>, db_key: MasterKey) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            db_key,
            block_size: DEFAULT_BLOCK_SIZE,
            umask: DEFAULT_UMASK,
            fresh: false,
            identity: Identity::ROOT,
        }
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn umask(mut self, umask: u32) -> Self {
        self.umask = umask;
        self
    }

    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }
}
