//! Inode manager.
//!
//! Owns the typed object store built on top of the key-value adapter:
//! inode allocation, directory entries (with synthesized `.`/`..`),
//! symlink targets and file blocks, all guarded by the ordered lock tables
//! in [`crate::lock`]. Every mutating operation here runs inside exactly one
//! [`KvStore::transaction`] call, so a caller either sees the whole change or
//! none of it.

pub mod dir;
pub mod file;
pub mod record;
pub mod symlink;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{fs_err, ErrorKind, FsResult};
use crate::kv::{KvStore, KvTxn};
use crate::lock::{AllocLocks, InodeLocks, LockGuard};
use crate::param::ROOT_INO;
use crate::stat::{InodeKind, Stat};

use record::{
    block_prefix, dirent_key, dirent_name, dirent_prefix, inode_key, next_ino_key, symlink_key,
    InodeRecord,
};

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// One resolved directory entry, as returned by [`InodeManager::readdir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub ino: u64,
    pub kind: InodeKind,
}

/// The typed object store. Cheap to clone: everything it owns is either
/// `Arc`-shared or `Copy`.
#[derive(Clone, Debug)]
pub struct InodeManager {
    store: KvStore,
    block_size: usize,
    inode_locks: Arc<InodeLocks>,
    alloc_locks: Arc<AllocLocks>,
}

impl InodeManager {
    pub fn new(store: KvStore, block_size: usize) -> Self {
        Self {
            store,
            block_size,
            inode_locks: Arc::new(InodeLocks::new()),
            alloc_locks: Arc::new(AllocLocks::new()),
        }
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Ensures the root inode exists, creating it on a brand-new store.
    pub async fn bootstrap(&self, root_mode: u32) -> FsResult<()> {
        let _guard = self.inode_locks.lock(&ROOT_INO).await;
        self.store.transaction(|txn| {
            if txn.get(&inode_key(ROOT_INO))?.is_some() {
                return Ok(());
            }
            let record = InodeRecord::new(InodeKind::Directory, root_mode, 0, 0, ROOT_INO, now());
            txn.insert(&inode_key(ROOT_INO), &record.encode())?;
            txn.insert(&next_ino_key(), &(ROOT_INO + 1).to_be_bytes())?;
            Ok(())
        })
    }

    fn get_record(&self, txn: &KvTxn, ino: u64) -> FsResult<InodeRecord> {
        let bytes = txn
            .get(&inode_key(ino))?
            .ok_or_else(|| fs_err!(ErrorKind::NoEntry))?;
        InodeRecord::decode(&bytes)
    }

    fn put_record(&self, txn: &KvTxn, ino: u64, record: &InodeRecord) -> FsResult<()> {
        txn.insert(&inode_key(ino), &record.encode())
    }

    pub async fn stat(&self, ino: u64) -> FsResult<Stat> {
        let bytes = self
            .store
            .get(&inode_key(ino))?
            .ok_or_else(|| fs_err!(ErrorKind::NoEntry))?;
        Ok(InodeRecord::decode(&bytes)?.to_stat(ino))
    }

    /// The parent directory's inode, as recorded on `ino` itself. The real
    /// root is its own parent (a self-loop), which callers walking this chain
    /// upward use as their stopping condition.
    pub async fn parent_ino(&self, ino: u64) -> FsResult<u64> {
        let bytes = self
            .store
            .get(&inode_key(ino))?
            .ok_or_else(|| fs_err!(ErrorKind::NoEntry))?;
        Ok(InodeRecord::decode(&bytes)?.parent)
    }

    /// Acquires and holds `ino`'s per-inode lock for the duration the
    /// returned guard lives. Exposed so callers like recursive `rmdir` can
    /// hold one directory's lock across several inode-manager calls that
    /// internally re-acquire the same key — safe because inode locks are
    /// reentrant on the same task.
    pub async fn hold_inode_lock(&self, ino: u64) -> LockGuard {
        self.inode_locks.lock(&ino).await
    }

    /// Resolves one child name within `parent`, synthesizing `.` and `..`.
    pub async fn lookup(&self, parent: u64, name: &str) -> FsResult<Option<(u64, InodeKind)>> {
        if name == "." {
            let stat = self.stat(parent).await?;
            return Ok(Some((parent, stat.kind)));
        }
        if name == ".." {
            let record_bytes = self
                .store
                .get(&inode_key(parent))?
                .ok_or_else(|| fs_err!(ErrorKind::NoEntry))?;
            let record = InodeRecord::decode(&record_bytes)?;
            let parent_stat = self.stat(record.parent).await?;
            return Ok(Some((record.parent, parent_stat.kind)));
        }
        match self.store.get(&dirent_key(parent, name))? {
            Some(value) => {
                let ino = dir::decode_dirent(&value)?;
                let stat = self.stat(ino).await?;
                Ok(Some((ino, stat.kind)))
            }
            None => Ok(None),
        }
    }

    /// Lists every entry in `ino`, including synthesized `.` and `..`.
    pub async fn readdir(&self, ino: u64) -> FsResult<Vec<DirEntry>> {
        let record_bytes = self
            .store
            .get(&inode_key(ino))?
            .ok_or_else(|| fs_err!(ErrorKind::NoEntry))?;
        let record = InodeRecord::decode(&record_bytes)?;
        if record.kind != InodeKind::Directory {
            return Err(fs_err!(ErrorKind::NotDirectory));
        }

        let mut entries = vec![
            DirEntry {
                name: ".".to_string(),
                ino,
                kind: InodeKind::Directory,
            },
            DirEntry {
                name: "..".to_string(),
                ino: record.parent,
                kind: InodeKind::Directory,
            },
        ];
        for (key, value) in self.store.scan_prefix(&dirent_prefix(ino))? {
            let name = dirent_name(&key, ino);
            let child_ino = dir::decode_dirent(&value)?;
            let child_stat = self.stat(child_ino).await?;
            entries.push(DirEntry {
                name,
                ino: child_ino,
                kind: child_stat.kind,
            });
        }
        Ok(entries)
    }

    pub async fn is_dir_empty(&self, ino: u64) -> FsResult<bool> {
        Ok(self.store.scan_prefix(&dirent_prefix(ino))?.is_empty())
    }

    /// Creates a new child of `kind` under `parent`. If `exclusive` is
    /// `false` and the name already exists, returns the existing entry
    /// instead of failing — this is what lets `open(O_CREAT)` (without
    /// `O_EXCL`) succeed against a concurrently-created file in one pass.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_child(
        &self,
        parent: u64,
        name: &str,
        kind: InodeKind,
        mode: u32,
        uid: u32,
        gid: u32,
        exclusive: bool,
        symlink_target: Option<&str>,
    ) -> FsResult<(u64, bool)> {
        let _alloc = self.alloc_locks.lock(&(parent, name.to_string())).await;
        let _inode = self.inode_locks.lock(&parent).await;

        self.store.transaction(|txn| {
            let mut parent_record = self.require_dir_sync(txn, parent)?;

            if let Some(existing) = txn.get(&dirent_key(parent, name))? {
                if exclusive {
                    return Err(fs_err!(ErrorKind::Exists));
                }
                let ino = dir::decode_dirent(&existing)?;
                return Ok((ino, false));
            }

            let next_ino_bytes = txn
                .get(&next_ino_key())?
                .ok_or_else(|| fs_err!(ErrorKind::InvalidArgument))?;
            let next_ino = u64::from_be_bytes(
                next_ino_bytes
                    .try_into()
                    .map_err(|_| fs_err!(ErrorKind::CorruptedChunk))?,
            );
            txn.insert(&next_ino_key(), &(next_ino + 1).to_be_bytes())?;

            let record = InodeRecord::new(kind, mode, uid, gid, parent, now());
            self.put_record(txn, next_ino, &record)?;
            txn.insert(&dirent_key(parent, name), &dir::encode_dirent(next_ino))?;

            if let Some(target) = symlink_target {
                txn.insert(&symlink_key(next_ino), &symlink::encode_target(target))?;
            }

            if kind == InodeKind::Directory {
                parent_record.nlink += 1;
            }
            parent_record.mtime = now();
            self.put_record(txn, parent, &parent_record)?;

            Ok((next_ino, true))
        })
    }

    /// Confirms `ino` names a directory, for use inside a transaction
    /// closure (which cannot `.await`).
    fn require_dir_sync(&self, txn: &KvTxn, ino: u64) -> FsResult<InodeRecord> {
        let record = self.get_record(txn, ino)?;
        if record.kind != InodeKind::Directory {
            return Err(fs_err!(ErrorKind::NotDirectory));
        }
        Ok(record)
    }

    /// Adds a new hard link `name` under `parent` pointing at `target_ino`.
    /// Directory hard links are out of scope and rejected with `EPERM`.
    pub async fn link(&self, parent: u64, name: &str, target_ino: u64) -> FsResult<()> {
        let _alloc = self.alloc_locks.lock(&(parent, name.to_string())).await;
        let mut keys = [parent, target_ino];
        keys.sort_unstable();
        let _guards = self.inode_locks.lock_ascending(&keys).await;

        self.store.transaction(|txn| {
            self.require_dir_sync(txn, parent)?;
            if txn.get(&dirent_key(parent, name))?.is_some() {
                return Err(fs_err!(ErrorKind::Exists));
            }
            let mut target = self.get_record(txn, target_ino)?;
            if target.kind == InodeKind::Directory {
                return Err(fs_err!(ErrorKind::NotPermitted));
            }
            target.nlink += 1;
            target.ctime = now();
            self.put_record(txn, target_ino, &target)?;
            txn.insert(&dirent_key(parent, name), &dir::encode_dirent(target_ino))?;
            Ok(())
        })
    }

    /// Removes `name` from `parent`. If the removed inode's link count drops
    /// to zero, it is reclaimed immediately unless `is_open` reports that
    /// some file descriptor has it open as of the start of this call, in
    /// which case the inode's `gc` flag is set and reclamation is deferred to
    /// [`Self::finalize_if_orphaned`]. The caller is expected to have
    /// snapshotted `is_open` for the relevant inode just before calling, so
    /// this accepts a plain bool rather than an async predicate (the
    /// transaction closure below cannot itself `.await`).
    pub async fn unlink(&self, parent: u64, name: &str, is_open: bool) -> FsResult<()> {
        let _alloc = self.alloc_locks.lock(&(parent, name.to_string())).await;

        let child_ino = match self.store.get(&dirent_key(parent, name))? {
            Some(value) => dir::decode_dirent(&value)?,
            None => return Err(fs_err!(ErrorKind::NoEntry)),
        };

        let mut keys = [parent, child_ino];
        keys.sort_unstable();
        let _guards = self.inode_locks.lock_ascending(&keys).await;

        self.store.transaction(|txn| {
            let mut parent_record = self.require_dir_sync(txn, parent)?;
            let dirent = txn
                .get(&dirent_key(parent, name))?
                .ok_or_else(|| fs_err!(ErrorKind::NoEntry))?;
            let ino = dir::decode_dirent(&dirent)?;
            let mut record = self.get_record(txn, ino)?;

            if record.kind == InodeKind::Directory {
                if !self.store.scan_prefix(&dirent_prefix(ino))?.is_empty() {
                    return Err(fs_err!(ErrorKind::NotEmpty));
                }
                parent_record.nlink -= 1;
            }

            txn.remove(&dirent_key(parent, name))?;
            parent_record.mtime = now();
            self.put_record(txn, parent, &parent_record)?;

            record.nlink = record.nlink.saturating_sub(1);
            record.ctime = now();
            if record.nlink == 0 {
                if is_open {
                    record.gc = true;
                    self.put_record(txn, ino, &record)?;
                } else {
                    self.delete_inode_contents(txn, ino, &record)?;
                }
            } else {
                self.put_record(txn, ino, &record)?;
            }
            Ok(())
        })
    }

    /// Deletes an inode's record and every block/symlink-target value under
    /// it. Called once `nlink` reaches zero and no descriptor holds it open.
    fn delete_inode_contents(&self, txn: &KvTxn, ino: u64, record: &InodeRecord) -> FsResult<()> {
        txn.remove(&inode_key(ino))?;
        if record.kind == InodeKind::Symlink {
            txn.remove(&symlink_key(ino))?;
        }
        if record.kind == InodeKind::File {
            for (key, _) in self.store.scan_prefix(&block_prefix(ino))? {
                txn.remove(&key)?;
            }
        }
        Ok(())
    }

    /// Called when the last file descriptor referencing `ino` closes; if the
    /// inode was already unlinked to zero links (`gc == true`), reclaims it
    /// now.
    pub async fn finalize_if_orphaned(&self, ino: u64) -> FsResult<()> {
        let _guard = self.inode_locks.lock(&ino).await;
        self.store.transaction(|txn| {
            let record = match txn.get(&inode_key(ino))? {
                Some(bytes) => InodeRecord::decode(&bytes)?,
                None => return Ok(()),
            };
            if record.gc && record.nlink == 0 {
                self.delete_inode_contents(txn, ino, &record)?;
            }
            Ok(())
        })
    }

    pub async fn read_symlink(&self, ino: u64) -> FsResult<String> {
        let bytes = self
            .store
            .get(&symlink_key(ino))?
            .ok_or_else(|| fs_err!(ErrorKind::InvalidArgument))?;
        symlink::decode_target(&bytes)
    }

    pub async fn read_range(&self, ino: u64, offset: u64, len: u64) -> FsResult<Vec<u8>> {
        let stat = self.stat(ino).await?;
        if stat.kind != InodeKind::File {
            return Err(fs_err!(ErrorKind::IsDirectory));
        }
        let end = offset.saturating_add(len).min(stat.size);
        if offset >= end {
            return Ok(Vec::new());
        }
        let block_size = self.block_size as u64;
        let mut out = Vec::with_capacity((end - offset) as usize);
        let mut pos = offset;
        while pos < end {
            let block_idx = pos / block_size;
            let block_off = (pos % block_size) as usize;
            let mut block = self
                .store
                .get(&record::block_key(ino, block_idx))?
                .unwrap_or_default();
            block.resize(self.block_size, 0);
            let take = ((end - pos) as usize).min(self.block_size - block_off);
            out.extend_from_slice(&block[block_off..block_off + take]);
            pos += take as u64;
        }
        Ok(out)
    }

    pub async fn write_range(&self, ino: u64, offset: u64, data: &[u8]) -> FsResult<u64> {
        let _guard = self.inode_locks.lock(&ino).await;
        let block_size = self.block_size;
        self.store.transaction(|txn| {
            let mut record = self.get_record(txn, ino)?;
            if record.kind != InodeKind::File {
                return Err(fs_err!(ErrorKind::IsDirectory));
            }

            let start_block = offset / block_size as u64;
            let start_in_block = (offset % block_size as u64) as usize;

            let merged = if start_in_block == 0 {
                data.to_vec()
            } else {
                let mut head = file::get_block(txn, ino, start_block, block_size)?;
                head.truncate(start_in_block);
                head.extend_from_slice(data);
                head
            };

            let new_extent = file::set_blocks(txn, ino, start_block, &merged, block_size)?;
            record.size = record.size.max(new_extent);
            record.mtime = now();
            self.put_record(txn, ino, &record)?;
            Ok(data.len() as u64)
        })
    }

    pub async fn truncate(&self, ino: u64, new_size: u64) -> FsResult<()> {
        let _guard = self.inode_locks.lock(&ino).await;
        let block_size = self.block_size as u64;
        self.store.transaction(|txn| {
            let mut record = self.get_record(txn, ino)?;
            if record.kind != InodeKind::File {
                return Err(fs_err!(ErrorKind::IsDirectory));
            }
            if new_size < record.size {
                let from_block = new_size.div_ceil(block_size);
                let scan = self.store.scan_prefix(&block_prefix(ino))?;
                file::truncate_blocks_from(txn, &scan, ino, from_block)?;
                let boundary = new_size % block_size;
                if boundary != 0 {
                    let idx = new_size / block_size;
                    let mut block = file::get_block(txn, ino, idx, block_size as usize)?;
                    block.truncate(boundary as usize);
                    txn.insert(&record::block_key(ino, idx), &block)?;
                }
            }
            record.size = new_size;
            record.mtime = now();
            self.put_record(txn, ino, &record)?;
            Ok(())
        })
    }

    /// Renames/moves `name` from `old_parent` into `new_parent` as
    /// `new_name`, replacing any existing entry there (files only; an
    /// existing non-empty directory target is rejected with `ENOTEMPTY`).
    /// Rejects moving a directory into itself or into one of its own
    /// descendants, which would otherwise open a cycle in the directory
    /// graph.
    pub async fn rename(
        &self,
        old_parent: u64,
        name: &str,
        new_parent: u64,
        new_name: &str,
    ) -> FsResult<()> {
        let _alloc_old = self
            .alloc_locks
            .lock(&(old_parent, name.to_string()))
            .await;
        let _alloc_new = self
            .alloc_locks
            .lock(&(new_parent, new_name.to_string()))
            .await;

        let mut keys = vec![old_parent, new_parent];
        keys.sort_unstable();
        keys.dedup();
        let _guards = self.inode_locks.lock_ascending(&keys).await;

        if let Some(value) = self.store.get(&dirent_key(old_parent, name))? {
            let moved_ino = dir::decode_dirent(&value)?;
            if self.stat(moved_ino).await?.kind == InodeKind::Directory {
                self.reject_if_ancestor(moved_ino, new_parent).await?;
            }
        }

        self.store.transaction(|txn| {
            let mut old_parent_record = self.require_dir_sync(txn, old_parent)?;
            let mut new_parent_record = self.require_dir_sync(txn, new_parent)?;

            let moved = txn
                .get(&dirent_key(old_parent, name))?
                .ok_or_else(|| fs_err!(ErrorKind::NoEntry))?;
            let moved_ino = dir::decode_dirent(&moved)?;

            if let Some(existing) = txn.get(&dirent_key(new_parent, new_name))? {
                let existing_ino = dir::decode_dirent(&existing)?;
                let existing_record = self.get_record(txn, existing_ino)?;
                if existing_record.kind == InodeKind::Directory {
                    if !self.store.scan_prefix(&dirent_prefix(existing_ino))?.is_empty() {
                        return Err(fs_err!(ErrorKind::NotEmpty));
                    }
                }
                txn.remove(&dirent_key(new_parent, new_name))?;
            }

            txn.remove(&dirent_key(old_parent, name))?;
            txn.insert(&dirent_key(new_parent, new_name), &dir::encode_dirent(moved_ino))?;

            let mut moved_record = self.get_record(txn, moved_ino)?;
            if moved_record.kind == InodeKind::Directory && old_parent != new_parent {
                moved_record.parent = new_parent;
                old_parent_record.nlink -= 1;
                new_parent_record.nlink += 1;
            }
            moved_record.ctime = now();
            self.put_record(txn, moved_ino, &moved_record)?;

            old_parent_record.mtime = now();
            new_parent_record.mtime = now();
            self.put_record(txn, old_parent, &old_parent_record)?;
            if new_parent != old_parent {
                self.put_record(txn, new_parent, &new_parent_record)?;
            }
            Ok(())
        })
    }

    /// Errors if `ancestor` is `node` itself or one of `node`'s ancestors,
    /// walking the `parent` chain up to the self-parenting root.
    async fn reject_if_ancestor(&self, ancestor: u64, mut node: u64) -> FsResult<()> {
        loop {
            if node == ancestor {
                return Err(fs_err!(ErrorKind::InvalidArgument));
            }
            let parent = self.parent_ino(node).await?;
            if parent == node {
                return Ok(());
            }
            node = parent;
        }
    }

    pub async fn set_mode(&self, ino: u64, mode: u32) -> FsResult<()> {
        let _guard = self.inode_locks.lock(&ino).await;
        self.store.transaction(|txn| {
            let mut record = self.get_record(txn, ino)?;
            record.mode = record.kind.mode_bits() | (mode & 0o7777);
            record.ctime = now();
            self.put_record(txn, ino, &record)
        })
    }

    pub async fn set_owner(&self, ino: u64, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        let _guard = self.inode_locks.lock(&ino).await;
        self.store.transaction(|txn| {
            let mut record = self.get_record(txn, ino)?;
            if let Some(uid) = uid {
                record.uid = uid;
            }
            if let Some(gid) = gid {
                record.gid = gid;
            }
            record.ctime = now();
            self.put_record(txn, ino, &record)
        })
    }

    pub async fn set_rdev(&self, ino: u64, rdev: u64) -> FsResult<()> {
        let _guard = self.inode_locks.lock(&ino).await;
        self.store.transaction(|txn| {
            let mut record = self.get_record(txn, ino)?;
            record.rdev = rdev;
            record.ctime = now();
            self.put_record(txn, ino, &record)
        })
    }

    pub async fn set_times(&self, ino: u64, atime: i64, mtime: i64) -> FsResult<()> {
        let _guard = self.inode_locks.lock(&ino).await;
        self.store.transaction(|txn| {
            let mut record = self.get_record(txn, ino)?;
            record.atime = atime;
            record.mtime = mtime;
            record.ctime = now();
            self.put_record(txn, ino, &record)
        })
    }
}
