//! Embedded key-value store backing the metadata tables.
//!
//! The in-memory BTreeMap implementation is the embedded default; the
//! trait keeps the door open for a disk-backed store without touching the
//! table layer. `write_batch` is the atomicity primitive: a save stages
//! every mutation and applies them in one batch or not at all.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{MetaError, MetaResult};

/// Key type for the KV store.
pub type Key = Vec<u8>;
/// Value type for the KV store.
pub type Value = Vec<u8>;
/// A key-value pair.
pub type KvPair = (Key, Value);

/// A single operation in a write batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Put a key-value pair.
    Put {
        /// The key to insert or update.
        key: Key,
        /// The value to store.
        value: Value,
    },
    /// Delete a key.
    Delete {
        /// The key to delete.
        key: Key,
    },
}

/// Key-value store trait for metadata persistence.
pub trait KvStore: Send + Sync {
    /// Get a value by key. Returns None if the key doesn't exist.
    fn get(&self, key: &[u8]) -> MetaResult<Option<Value>>;

    /// Put a key-value pair. Overwrites any existing value.
    fn put(&self, key: Key, value: Value) -> MetaResult<()>;

    /// Delete a key. Ok even if the key didn't exist.
    fn delete(&self, key: &[u8]) -> MetaResult<()>;

    /// Returns true if the key exists.
    fn contains_key(&self, key: &[u8]) -> MetaResult<bool>;

    /// Scan all keys with the given prefix, in sorted key order.
    fn scan_prefix(&self, prefix: &[u8]) -> MetaResult<Vec<KvPair>>;

    /// Atomically apply a batch of puts and deletes.
    fn write_batch(&self, ops: Vec<BatchOp>) -> MetaResult<()>;
}

/// In-memory KV store backed by a BTreeMap. Thread-safe via RwLock.
pub struct MemoryKvStore {
    data: Arc<RwLock<BTreeMap<Key, Value>>>,
}

impl MemoryKvStore {
    /// Creates a new empty in-memory KV store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &[u8]) -> MetaResult<Option<Value>> {
        let data = self.data.read().map_err(|e| MetaError::Kv(e.to_string()))?;
        Ok(data.get(key).cloned())
    }

    fn put(&self, key: Key, value: Value) -> MetaResult<()> {
        let mut data = self.data.write().map_err(|e| MetaError::Kv(e.to_string()))?;
        data.insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> MetaResult<()> {
        let mut data = self.data.write().map_err(|e| MetaError::Kv(e.to_string()))?;
        data.remove(key);
        Ok(())
    }

    fn contains_key(&self, key: &[u8]) -> MetaResult<bool> {
        let data = self.data.read().map_err(|e| MetaError::Kv(e.to_string()))?;
        Ok(data.contains_key(key))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> MetaResult<Vec<KvPair>> {
        let data = self.data.read().map_err(|e| MetaError::Kv(e.to_string()))?;
        let mut result = Vec::new();
        for (k, v) in data.range::<Vec<u8>, _>(prefix.to_vec()..) {
            if !k.starts_with(prefix) {
                break;
            }
            result.push((k.clone(), v.clone()));
        }
        Ok(result)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> MetaResult<()> {
        let mut data = self.data.write().map_err(|e| MetaError::Kv(e.to_string()))?;
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}
