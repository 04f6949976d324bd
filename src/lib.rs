//! An encrypted, POSIX-flavored filesystem over a transactional key-value store.
//!
//! Reads and writes flow through four layers, bottom to top:
//! [`codec`] (per-block AEAD framing) wraps every value the [`kv`] adapter
//! persists; [`inode`] builds typed objects (inodes, directory entries,
//! symlink targets, file blocks) on top of the key-value adapter's atomic
//! transactions; [`resolver`] walks paths down to inodes through the
//! [`lock`]-guarded inode manager; and [`facade`] exposes all of that as a
//! conventional `open`/`read`/`write`/`mkdir`/`rename` surface, backed by a
//! [`fd`] table and [`stream`] wrappers for range-bounded I/O.

pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod fcntl;
pub mod fd;
pub mod inode;
pub mod kv;
pub mod lock;
pub mod param;
pub mod path;
pub mod resolver;
pub mod stat;
pub mod stream;

pub use config::{FsOptions, Identity, MasterKey};
pub use error::{ErrorKind, FsError, FsResult};
pub use facade::{Access, Filesystem};
pub use stat::{InodeKind, Stat};
