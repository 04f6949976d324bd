//! Symlink target storage: one UTF-8 path string per symlink inode.

use crate::error::{ErrorKind, FsError, FsResult};

pub fn encode_target(target: &str) -> Vec<u8> {
    target.as_bytes().to_vec()
}

pub fn decode_target(value: &[u8]) -> FsResult<String> {
    String::from_utf8(value.to_vec()).map_err(|_| FsError::new(ErrorKind::CorruptedChunk))
}
