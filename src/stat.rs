//! Stat record returned by `stat`/`lstat`/`fstat`.

use serde::{Deserialize, Serialize};

/// Discriminates what an inode number actually names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InodeKind {
    File,
    Directory,
    Symlink,
    /// A reserved type tag for device-like inodes; no device semantics are
    /// implemented beyond carrying an `rdev` number.
    Device,
}

impl InodeKind {
    /// The POSIX `S_IF*` bits corresponding to this kind, as stored in `mode`.
    pub fn mode_bits(self) -> u32 {
        match self {
            InodeKind::File => 0o100_000,
            InodeKind::Directory => 0o040_000,
            InodeKind::Symlink => 0o120_000,
            InodeKind::Device => 0o020_000,
        }
    }
}

/// Snapshot of one inode's metadata, as returned by `stat`/`lstat`/`fstat`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Stat {
    pub ino: u64,
    pub kind: InodeKind,
    /// Full mode word: type bits (see [`InodeKind::mode_bits`]) plus permission bits.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub size: u64,
    /// Number of 512-byte blocks allocated to the file, POSIX-style.
    pub blocks: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub birthtime: i64,
    /// Device number, meaningful only when `kind == InodeKind::Device`.
    pub rdev: u64,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == InodeKind::Symlink
    }

    pub fn is_file(&self) -> bool {
        self.kind == InodeKind::File
    }
}
