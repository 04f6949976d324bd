use std::sync::Arc;

use sled::transaction::{TransactionalTree, UnabortableTransactionError};

use crate::codec::BlockCodec;
use crate::error::{ErrorKind, FsError};

/// A handle into one in-flight transaction against the shared tree.
///
/// Borrowed for the duration of the closure passed to
/// [`crate::kv::KvStore::transaction`]; reads observe this transaction's own
/// uncommitted writes, per sled's read-your-writes guarantee for
/// transactional trees.
pub struct KvTxn<'a> {
    tree: &'a TransactionalTree,
    codec: &'a Arc<BlockCodec>,
}

impl<'a> KvTxn<'a> {
    pub(crate) fn new(tree: &'a TransactionalTree, codec: &'a Arc<BlockCodec>) -> Self {
        Self { tree, codec }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, FsError> {
        let chunk = self.tree.get(key).map_err(storage_err)?;
        match chunk {
            Some(chunk) => Ok(Some(self.codec.decrypt_value(&chunk)?)),
            None => Ok(None),
        }
    }

    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<(), FsError> {
        let chunk = self.codec.encrypt_value(value)?;
        self.tree.insert(key, chunk).map_err(storage_err)?;
        Ok(())
    }

    pub fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>, FsError> {
        let prior = self.tree.remove(key).map_err(storage_err)?;
        match prior {
            Some(chunk) => Ok(Some(self.codec.decrypt_value(&chunk)?)),
            None => Ok(None),
        }
    }

    /// `true` if `key` has a value in this transaction's view of the tree.
    pub fn contains_key(&self, key: &[u8]) -> Result<bool, FsError> {
        Ok(self.tree.get(key).map_err(storage_err)?.is_some())
    }
}

fn storage_err(_: UnabortableTransactionError) -> FsError {
    FsError::new(ErrorKind::Busy)
}
