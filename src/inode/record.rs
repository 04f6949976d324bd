//! On-disk inode record and key-space encoding.
//!
//! Every record type the inode manager persists gets its own one-byte tag
//! prefix, so an ordered scan over one tag's keys (used for directory
//! listings and file block enumeration) never wanders into another record
//! type's entries.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, FsError, FsResult};
use crate::stat::{InodeKind, Stat};

/// The persisted representation of one inode's metadata. [`Stat`] is derived
/// from this plus the inode number the caller already knows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InodeRecord {
    pub kind: InodeKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub birthtime: i64,
    pub rdev: u64,
    /// The directory's parent inode, used to resolve `..` without a reverse
    /// scan. Meaningless for non-directories.
    pub parent: u64,
    /// Set once `nlink` reaches zero while some file descriptor still has the
    /// inode open: the inode is unreachable from any directory but not yet
    /// reclaimed. Cleared by deletion once the last descriptor closes.
    pub gc: bool,
}

impl InodeRecord {
    pub fn new(kind: InodeKind, mode: u32, uid: u32, gid: u32, parent: u64, now: i64) -> Self {
        let nlink = if kind == InodeKind::Directory { 2 } else { 1 };
        Self {
            kind,
            mode: kind.mode_bits() | (mode & 0o7777),
            uid,
            gid,
            nlink,
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
            rdev: 0,
            parent,
            gc: false,
        }
    }

    pub fn to_stat(&self, ino: u64) -> Stat {
        Stat {
            ino,
            kind: self.kind,
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            nlink: self.nlink,
            size: self.size,
            blocks: self.size.div_ceil(512),
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            birthtime: self.birthtime,
            rdev: self.rdev,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("InodeRecord is always representable as JSON")
    }

    pub fn decode(bytes: &[u8]) -> FsResult<Self> {
        serde_json::from_slice(bytes).map_err(|_| FsError::new(ErrorKind::CorruptedChunk))
    }
}

mod tag {
    pub const INODE: u8 = 1;
    pub const DIRENT: u8 = 2;
    pub const SYMLINK: u8 = 3;
    pub const BLOCK: u8 = 4;
    pub const NEXT_INO: u8 = 5;
}

pub fn inode_key(ino: u64) -> Vec<u8> {
    let mut key = vec![tag::INODE];
    key.extend_from_slice(&ino.to_be_bytes());
    key
}

pub fn dirent_prefix(parent: u64) -> Vec<u8> {
    let mut key = vec![tag::DIRENT];
    key.extend_from_slice(&parent.to_be_bytes());
    key
}

pub fn dirent_key(parent: u64, name: &str) -> Vec<u8> {
    let mut key = dirent_prefix(parent);
    key.extend_from_slice(name.as_bytes());
    key
}

/// Recovers the entry name from a key previously produced by [`dirent_key`],
/// given the same `parent`.
pub fn dirent_name(key: &[u8], parent: u64) -> String {
    let prefix_len = dirent_prefix(parent).len();
    String::from_utf8_lossy(&key[prefix_len..]).into_owned()
}

pub fn symlink_key(ino: u64) -> Vec<u8> {
    let mut key = vec![tag::SYMLINK];
    key.extend_from_slice(&ino.to_be_bytes());
    key
}

pub fn block_prefix(ino: u64) -> Vec<u8> {
    let mut key = vec![tag::BLOCK];
    key.extend_from_slice(&ino.to_be_bytes());
    key
}

pub fn block_key(ino: u64, index: u64) -> Vec<u8> {
    let mut key = block_prefix(ino);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

/// Recovers the block index from a key previously produced by [`block_key`].
pub fn block_index(key: &[u8], ino: u64) -> u64 {
    let prefix_len = block_prefix(ino).len();
    u64::from_be_bytes(key[prefix_len..].try_into().expect("block key is well-formed"))
}

pub fn next_ino_key() -> Vec<u8> {
    vec![tag::NEXT_INO]
}
