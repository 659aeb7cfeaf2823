use anyhow::Result;
use bytes::Bytes;

mod memkv;
mod sledkv;

pub use memkv::MemStore;
pub use sledkv::SledStore;

/// Forward-only scan over a key range, ascending by key.
pub type KvIter = Box<dyn Iterator<Item = Result<(Bytes, Bytes)>> + Send>;

/// Upserts staged in memory and committed with a single
/// [`KvStore::kv_write_batch`] call. Dropping an uncommitted batch discards it.
#[derive(Debug, Default)]
pub struct WriteBatch {
    items: Vec<(Bytes, Bytes)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: Bytes, value: Bytes) {
        self.items.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<(Bytes, Bytes)> {
        self.items
    }
}

/// Ordered key-value engine the store is built on.
///
/// Implementations must keep keys sorted bytewise, apply a batch atomically
/// and return scans in ascending key order.
pub trait KvStore: Send + Sync {
    /// Removes every key starting with `prefix`, returns how many were removed.
    fn kv_delete_prefix(&self, prefix: Bytes) -> Result<usize>;
    fn kv_write_batch(&self, batch: WriteBatch) -> Result<()>;

    fn kv_scan(&self, prefix: Bytes) -> Result<KvIter>;

    fn kv_flush(&self) -> Result<()>;
}
