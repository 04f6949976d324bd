//! Directory entry value encoding.
//!
//! A directory entry's key already carries the parent inode and the child's
//! name (see [`super::record::dirent_key`]); the value is just the eight
//! bytes of the child's inode number. `.` and `..` are never stored — they're
//! synthesized from the directory's own inode number and its `parent` field.

use crate::error::{ErrorKind, FsError, FsResult};

pub fn encode_dirent(child_ino: u64) -> Vec<u8> {
    child_ino.to_be_bytes().to_vec()
}

pub fn decode_dirent(value: &[u8]) -> FsResult<u64> {
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| FsError::new(ErrorKind::CorruptedChunk))?;
    Ok(u64::from_be_bytes(bytes))
}
