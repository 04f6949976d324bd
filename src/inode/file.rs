//! File block storage.
//!
//! A file's bytes are split into fixed-size blocks (`block_size`), each
//! stored under its own key (see [`super::record::block_key`]). Blocks past
//! the end of the file are simply absent; reading them back as zero bytes is
//! the caller's job, not this module's (sparse files are not modeled).

use crate::error::{fs_err, ErrorKind, FsResult};
use crate::inode::record::block_key;
use crate::kv::KvTxn;
use crate::param::MAX_FILE_SIZE;

/// Writes `data` starting at `start_block`, spanning as many blocks as
/// needed. Only the very last block written may be shorter than
/// `block_size` — a write that starts mid-file (`start_block > 0`) and
/// supplies a short final block is the normal "write up to the new end of
/// file" case; the resulting file size is `start_block * block_size +
/// data.len()`. This function never receives more than one short block by
/// construction, so there is no ambiguity to resolve at this layer.
///
/// Errors with `file-too-big` rather than silently wrapping if the
/// resulting size would overflow `u64` or exceed [`MAX_FILE_SIZE`].
pub fn set_blocks(
    txn: &KvTxn,
    ino: u64,
    start_block: u64,
    data: &[u8],
    block_size: usize,
) -> FsResult<u64> {
    if block_size == 0 {
        return Err(fs_err!(ErrorKind::InvalidArgument, "write"));
    }
    if data.is_empty() {
        return Ok(start_block * block_size as u64);
    }

    let new_size = start_block
        .checked_mul(block_size as u64)
        .and_then(|base| base.checked_add(data.len() as u64))
        .filter(|&size| size <= MAX_FILE_SIZE)
        .ok_or_else(|| fs_err!(ErrorKind::FileTooBig, "write"))?;

    let num_blocks = data.len().div_ceil(block_size);
    for i in 0..num_blocks {
        let lo = i * block_size;
        let hi = (lo + block_size).min(data.len());
        txn.insert(&block_key(ino, start_block + i as u64), &data[lo..hi])?;
    }
    Ok(new_size)
}

/// Reads one block, zero-padded to `block_size` if the stored block (or the
/// whole key) is short/absent.
pub fn get_block(txn: &KvTxn, ino: u64, index: u64, block_size: usize) -> FsResult<Vec<u8>> {
    let mut block = txn.get(&block_key(ino, index))?.unwrap_or_default();
    block.resize(block_size, 0);
    Ok(block)
}

/// Removes every block at or beyond `from_block`, used when truncating a
/// file down or deleting it outright.
pub fn truncate_blocks_from(
    txn: &KvTxn,
    scan: &[(Vec<u8>, Vec<u8>)],
    ino: u64,
    from_block: u64,
) -> FsResult<()> {
    use crate::inode::record::block_index;
    for (key, _) in scan {
        if block_index(key, ino) >= from_block {
            txn.remove(key)?;
        }
    }
    Ok(())
}
