//! Key-value store adapter.
//!
//! Everything the filesystem persists — inode records, directory entries,
//! symlink targets, file blocks — lives as an encrypted value under some key
//! in one shared, ordered keyspace. This module is a thin wrapper around
//! `sled`: it adds whole-value encryption (via [`crate::codec::BlockCodec`])
//! and exposes exactly the operations the inode manager needs (point
//! get/insert/remove inside an atomic transaction, plus unordered-free
//! prefix scans for directory listings). Namespacing keys so unrelated
//! record types never collide is the caller's job, not this module's.

mod txn;

use std::sync::Arc;

use sled::transaction::{ConflictableTransactionError, TransactionError};

use crate::codec::BlockCodec;
use crate::config::FsOptions;
use crate::error::{ErrorKind, FsError, FsResult};

pub use txn::KvTxn;

const MARKER_KEY: &[u8] = b"\xffcryptofs-marker";
const MARKER_VALUE: &[u8] = b"cryptofs-marker-v1";

/// Handle to the encrypted, transactional key-value store backing one mounted
/// filesystem. Cheap to clone: internally reference-counted.
#[derive(Clone, Debug)]
pub struct KvStore {
    tree: sled::Tree,
    codec: Arc<BlockCodec>,
}

impl KvStore {
    /// Opens (creating if absent) the store at `options.db_path`, deriving
    /// the block codec from `options.db_key`. Fails with
    /// [`ErrorKind::KeyIncorrect`] if the store already holds state sealed
    /// under a different master key.
    pub fn open(options: &FsOptions) -> FsResult<Self> {
        if options.fresh {
            let _ = std::fs::remove_dir_all(&options.db_path);
        }
        std::fs::create_dir_all(&options.db_path)
            .map_err(|_| fs_err_path(ErrorKind::InvalidArgument, &options.db_path))?;

        let db = sled::open(&options.db_path)
            .map_err(|_| fs_err_path(ErrorKind::InvalidArgument, &options.db_path))?;
        let tree = db
            .open_tree(b"cryptofs")
            .map_err(|_| fs_err_path(ErrorKind::InvalidArgument, &options.db_path))?;

        let codec = Arc::new(BlockCodec::new(
            options.db_key.clone(),
            options.block_size as usize,
        ));
        let store = Self { tree, codec };
        store.verify_key()?;
        Ok(store)
    }

    /// Round-trips a small marker record to confirm the configured master key
    /// matches the one the store was sealed with. A freshly created store has
    /// no marker yet, so the first open under any key succeeds and seals it.
    fn verify_key(&self) -> FsResult<()> {
        match self
            .tree
            .get(MARKER_KEY)
            .map_err(|_| FsError::new(ErrorKind::Busy))?
        {
            Some(chunk) => {
                let plain = self
                    .codec
                    .decrypt_value(&chunk)
                    .map_err(|_| FsError::new(ErrorKind::KeyIncorrect))?;
                if plain != MARKER_VALUE {
                    return Err(FsError::new(ErrorKind::KeyIncorrect));
                }
                Ok(())
            }
            None => {
                let chunk = self.codec.encrypt_value(MARKER_VALUE)?;
                self.tree
                    .insert(MARKER_KEY, chunk)
                    .map_err(|_| FsError::new(ErrorKind::Busy))?;
                Ok(())
            }
        }
    }

    pub fn codec(&self) -> &BlockCodec {
        &self.codec
    }

    /// Flushes any buffered writes to disk. There's no separate write-ahead
    /// log to fsync independently of the data it describes, so `fsync` and
    /// `fdatasync` both resolve to this.
    pub async fn flush(&self) -> FsResult<()> {
        self.tree
            .flush_async()
            .await
            .map_err(|_| FsError::new(ErrorKind::Busy))?;
        Ok(())
    }

    /// Runs `body` inside one atomic transaction over the shared tree.
    /// Returning `Err` aborts and rolls the transaction back; sled retries
    /// automatically on write conflicts, so `body` must be side-effect free
    /// beyond the `KvTxn` it's given.
    pub fn transaction<T>(&self, body: impl Fn(&KvTxn) -> FsResult<T>) -> FsResult<T> {
        self.tree
            .transaction(|tx_tree| {
                let txn = KvTxn::new(tx_tree, &self.codec);
                body(&txn).map_err(ConflictableTransactionError::Abort)
            })
            .map_err(|err: TransactionError<FsError>| match err {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(_) => FsError::new(ErrorKind::Busy),
            })
    }

    /// Point read outside of any transaction. Used for reads that don't need
    /// transactional isolation, e.g. serving file data once the owning
    /// inode's lock is already held by the caller.
    pub fn get(&self, key: &[u8]) -> FsResult<Option<Vec<u8>>> {
        match self
            .tree
            .get(key)
            .map_err(|_| FsError::new(ErrorKind::Busy))?
        {
            Some(chunk) => Ok(Some(self.codec.decrypt_value(&chunk)?)),
            None => Ok(None),
        }
    }

    /// Ordered scan of every key carrying the given prefix, decrypted.
    /// Not transactional: sled's transactional trees don't support range
    /// scans, so directory listings and emptiness checks read the committed
    /// tree directly and rely on the caller already holding the relevant
    /// per-inode lock for consistency.
    pub fn scan_prefix(&self, prefix: &[u8]) -> FsResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for entry in self.tree.scan_prefix(prefix) {
            let (key, chunk) = entry.map_err(|_| FsError::new(ErrorKind::Busy))?;
            let value = self.codec.decrypt_value(&chunk)?;
            out.push((key.to_vec(), value));
        }
        Ok(out)
    }
}

fn fs_err_path(kind: ErrorKind, path: &std::path::Path) -> FsError {
    FsError::new(kind).with_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterKey;

    fn options(dir: &tempfile::TempDir) -> FsOptions {
        FsOptions::new(dir.path(), MasterKey::new([3u8; 32]))
    }

    #[test]
    fn reopening_with_same_key_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _store = KvStore::open(&options(&dir)).unwrap();
        }
        let _store = KvStore::open(&options(&dir)).unwrap();
    }

    #[test]
    fn reopening_with_wrong_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _store = KvStore::open(&options(&dir)).unwrap();
        }
        let mut bad = options(&dir);
        bad.db_key = MasterKey::new([9u8; 32]);
        let err = KvStore::open(&bad).unwrap_err();
        assert_eq!(err.kind, ErrorKind::KeyIncorrect);
    }

    #[test]
    fn transaction_commits_point_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(&options(&dir)).unwrap();
        store
            .transaction(|txn| {
                txn.insert(b"k1", b"v1")?;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(&options(&dir)).unwrap();
        let result: FsResult<()> = store.transaction(|txn| {
            txn.insert(b"k2", b"v2")?;
            Err(FsError::new(ErrorKind::InvalidArgument))
        });
        assert!(result.is_err());
        assert_eq!(store.get(b"k2").unwrap(), None);
    }
}
