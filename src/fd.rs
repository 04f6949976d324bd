//! File descriptor table.
//!
//! Mirrors the teacher's `RcFile`/`File` pair: a descriptor is a handle to a
//! shared, ref-counted open-file record (ino, flags, cursor). `dup` doesn't
//! copy that record, it shares it — both descriptors then advance the same
//! read/write position, matching POSIX `dup`/`dup2` semantics. Plain
//! concurrent `open` calls on the same path instead get independent records,
//! each with its own cursor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{fs_err, ErrorKind, FsResult};
use crate::fcntl::OFlags;

/// The mutable state behind one or more file descriptors that share it via `dup`.
#[derive(Debug)]
pub struct OpenFile {
    pub ino: u64,
    pub flags: OFlags,
    pub position: u64,
}

/// A process-wide (or session-wide) table of open file descriptors.
#[derive(Debug)]
pub struct FdTable {
    next_fd: AtomicU32,
    entries: Mutex<HashMap<u32, Arc<Mutex<OpenFile>>>>,
    /// Number of live descriptors referencing each inode, across all fds —
    /// consulted by the inode manager's unlink path to decide whether a
    /// zero-`nlink` inode must wait for its last descriptor to close.
    open_refs: Mutex<HashMap<u64, u32>>,
}

impl Default for FdTable {
    fn default() -> Self {
        Self {
            next_fd: AtomicU32::new(3), // 0/1/2 conventionally reserved for stdio
            entries: Mutex::new(HashMap::new()),
            open_refs: Mutex::new(HashMap::new()),
        }
    }
}

impl FdTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self, ino: u64, flags: OFlags) -> u32 {
        let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
        let file = Arc::new(Mutex::new(OpenFile {
            ino,
            flags,
            position: 0,
        }));
        self.entries.lock().await.insert(fd, file);
        *self.open_refs.lock().await.entry(ino).or_insert(0) += 1;
        fd
    }

    pub async fn get(&self, fd: u32) -> FsResult<Arc<Mutex<OpenFile>>> {
        self.entries
            .lock()
            .await
            .get(&fd)
            .cloned()
            .ok_or_else(|| fs_err!(ErrorKind::BadFd))
    }

    /// Duplicates `fd` onto a new descriptor sharing the same cursor.
    pub async fn dup(&self, fd: u32) -> FsResult<u32> {
        let file = self.get(fd).await?;
        let ino = file.lock().await.ino;
        let new_fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().await.insert(new_fd, file);
        *self.open_refs.lock().await.entry(ino).or_insert(0) += 1;
        Ok(new_fd)
    }

    /// Closes `fd`. Returns the inode it referenced and whether that was the
    /// last descriptor open against that inode (the caller should run
    /// [`crate::inode::InodeManager::finalize_if_orphaned`] when it was).
    pub async fn close(&self, fd: u32) -> FsResult<(u64, bool)> {
        let file = self
            .entries
            .lock()
            .await
            .remove(&fd)
            .ok_or_else(|| fs_err!(ErrorKind::BadFd))?;
        let ino = file.lock().await.ino;

        let mut refs = self.open_refs.lock().await;
        let remaining = match refs.get_mut(&ino) {
            Some(count) => {
                *count -= 1;
                let zero = *count == 0;
                if zero {
                    refs.remove(&ino);
                }
                zero
            }
            None => true,
        };
        Ok((ino, remaining))
    }

    pub async fn is_open(&self, ino: u64) -> bool {
        self.open_refs.lock().await.contains_key(&ino)
    }
}
