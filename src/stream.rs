//! Range-bounded read/write streams over an open file.
//!
//! These sit one level above the plain `read`/`write` facade calls: each
//! stream remembers its own cursor within an optional `{start, end}` window
//! — both ends inclusive — so a caller streaming a large file doesn't have
//! to track offsets itself.

use crate::error::{fs_err, ErrorKind, FsResult};
use crate::inode::InodeManager;

/// A bounded read cursor over one inode's bytes.
pub struct ReadStream {
    inodes: InodeManager,
    ino: u64,
    pos: u64,
    end: u64,
}

impl ReadStream {
    /// Opens a stream over `{start, end}` of `ino`'s content, both ends
    /// inclusive — `end = Some(9)` reads byte index 9 too. `end` of `None`
    /// reads to the inode's current size.
    pub async fn new(inodes: InodeManager, ino: u64, start: u64, end: Option<u64>) -> FsResult<Self> {
        let stat = inodes.stat(ino).await?;
        let end_exclusive = match end {
            Some(inclusive_end) => {
                if start > inclusive_end {
                    return Err(fs_err!(ErrorKind::InvalidArgument, "read"));
                }
                inclusive_end.saturating_add(1).min(stat.size)
            }
            None => stat.size,
        };
        Ok(Self {
            inodes,
            ino,
            pos: start,
            end: end_exclusive,
        })
    }

    /// Reads up to `max_len` bytes, advancing the stream's cursor. An empty
    /// result means the stream is exhausted.
    pub async fn read_chunk(&mut self, max_len: usize) -> FsResult<Vec<u8>> {
        if self.pos >= self.end {
            return Ok(Vec::new());
        }
        let want = (self.end - self.pos).min(max_len as u64);
        let data = self.inodes.read_range(self.ino, self.pos, want).await?;
        self.pos += data.len() as u64;
        Ok(data)
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.end
    }
}

/// A bounded write cursor over one inode's bytes.
pub struct WriteStream {
    inodes: InodeManager,
    ino: u64,
    pos: u64,
}

impl WriteStream {
    pub fn new(inodes: InodeManager, ino: u64, start: u64) -> Self {
        Self {
            inodes,
            ino,
            pos: start,
        }
    }

    /// Writes `data` at the stream's current position, advancing it by
    /// `data.len()`.
    pub async fn write_chunk(&mut self, data: &[u8]) -> FsResult<u64> {
        let written = self.inodes.write_range(self.ino, self.pos, data).await?;
        self.pos += written;
        Ok(written)
    }

    pub fn position(&self) -> u64 {
        self.pos
    }
}
