//! Ordered locking.
//!
//! Two families of locks guard concurrent access to the store:
//!
//! - **Inode locks**, one per inode number, guard a single inode's record,
//!   directory entries, symlink target and file blocks. Any operation that
//!   must hold more than one must acquire them in strictly ascending inode
//!   order (see [`InodeLocks::lock_ascending`]) so that two transactions
//!   touching the same pair of inodes can never deadlock against each other.
//! - **Allocation locks**, keyed by `(parent inode, child name)`, serialize
//!   the "does this name already exist" check against a concurrent creation
//!   of the same name. They are always acquired *outside* (before) any inode
//!   lock, never nested inside one.
//!
//! Locks are created lazily and never removed: the table grows with the
//! number of distinct inodes/names ever touched, trading a small amount of
//! memory for never needing a reference count on the lock entries themselves.
//!
//! Both families are reentrant on the same task: a task that already holds a
//! key's lock can acquire it again (directly, or transitively through
//! `lock_ascending`) without blocking on itself. This is what lets recursive
//! `rmdir` hold a directory's inode lock across its whole drain while the
//! `unlink` calls it makes against that same directory re-acquire the lock
//! internally.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task;

#[derive(Debug)]
struct KeyLock {
    mutex: Arc<Mutex<()>>,
    holder: StdMutex<Option<(task::Id, u32)>>,
}

/// A held lock for one key. Dropping it releases the key for other tasks once
/// the holding task's reentrant acquisition count reaches zero.
pub struct LockGuard {
    lock: Arc<KeyLock>,
    // `Some` only for the outermost acquisition on this task; reentrant
    // re-acquisitions hold no guard of their own, relying on the outermost
    // one to release the underlying mutex once the holder count hits zero.
    _guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut holder = self.lock.holder.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, count)) = holder.as_mut() {
            *count -= 1;
            if *count == 0 {
                *holder = None;
            }
        }
    }
}

/// A lazily-populated table of per-key async mutexes.
#[derive(Debug)]
pub struct LockTable<K> {
    entries: StdMutex<HashMap<K, Arc<KeyLock>>>,
}

impl<K: Eq + Hash + Clone> Default for LockTable<K> {
    fn default() -> Self {
        Self {
            entries: StdMutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> LockTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &K) -> Arc<KeyLock> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(KeyLock {
                    mutex: Arc::new(Mutex::new(())),
                    holder: StdMutex::new(None),
                })
            })
            .clone()
    }

    /// Acquires the lock for a single key. Reentrant: if the calling task
    /// already holds this key, returns immediately instead of blocking.
    pub async fn lock(&self, key: &K) -> LockGuard {
        let key_lock = self.entry(key);
        let current = task::id();

        {
            let mut holder = key_lock.holder.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((owner, count)) = holder.as_mut() {
                if *owner == current {
                    *count += 1;
                    return LockGuard {
                        lock: key_lock.clone(),
                        _guard: None,
                    };
                }
            }
        }

        let guard = key_lock.mutex.clone().lock_owned().await;
        *key_lock.holder.lock().unwrap_or_else(|e| e.into_inner()) = Some((current, 1));
        LockGuard {
            lock: key_lock,
            _guard: Some(guard),
        }
    }
}

impl<K: Eq + Hash + Clone + Ord> LockTable<K> {
    /// Acquires locks for every key in `keys`, sorted ascending, deduplicated.
    /// This is the only safe way to hold more than one key's lock at a time:
    /// callers that always go through this method can never form a lock
    /// cycle with each other.
    pub async fn lock_ascending(&self, keys: &[K]) -> Vec<LockGuard> {
        let mut sorted: Vec<K> = keys.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for key in &sorted {
            guards.push(self.lock(key).await);
        }
        guards
    }
}

/// Per-inode locks, keyed by inode number.
pub type InodeLocks = LockTable<u64>;

/// Allocation locks, keyed by `(parent inode, child name)`.
pub type AllocLocks = LockTable<(u64, String)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ascending_lock_dedups_repeated_keys() {
        let table: Arc<InodeLocks> = Arc::new(LockTable::new());
        let table2 = table.clone();
        let guards = tokio::spawn(async move { table2.lock_ascending(&[5, 2, 5, 2, 9]).await })
            .await
            .unwrap();
        assert_eq!(guards.len(), 3);
    }

    #[tokio::test]
    async fn distinct_keys_lock_independently() {
        let table: Arc<InodeLocks> = Arc::new(LockTable::new());
        let table2 = table.clone();
        tokio::spawn(async move {
            let _a = table2.lock(&1).await;
            // A different key must not block on the first key's guard.
            let _b = tokio::time::timeout(std::time::Duration::from_millis(50), table2.lock(&2))
                .await
                .expect("locking a distinct key should not time out");
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn same_task_reacquires_without_blocking() {
        let table: Arc<InodeLocks> = Arc::new(LockTable::new());
        let table2 = table.clone();
        tokio::spawn(async move {
            let _outer = table2.lock(&7).await;
            // Re-locking the same key from the same task must not deadlock.
            let _inner = tokio::time::timeout(std::time::Duration::from_millis(50), table2.lock(&7))
                .await
                .expect("reentrant lock on the same task should not time out");
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn different_task_blocks_until_released() {
        let table: Arc<InodeLocks> = Arc::new(LockTable::new());
        let holder = table.clone();
        let (outer, outer_release) = {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
            let handle = tokio::spawn(async move {
                let _guard = holder.lock(&3).await;
                ready_tx.send(()).unwrap();
                rx.await.ok();
            });
            ready_rx.await.unwrap();
            (handle, tx)
        };

        let other = table.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock(&3).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "a different task must wait for the lock");

        outer_release.send(()).unwrap();
        outer.await.unwrap();
        waiter.await.unwrap();
    }
}
