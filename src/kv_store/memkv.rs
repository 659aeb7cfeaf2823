use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use parking_lot::RwLock;

use super::{KvIter, KvStore, WriteBatch};

/// Entries copied out of the map per lock acquisition while scanning.
const MEM_SCAN_CHUNK: usize = 64;

type MemMap = Arc<RwLock<BTreeMap<Bytes, Bytes>>>;

/// In-process ordered store. Nothing survives the process.
#[derive(Default)]
pub struct MemStore {
    data: MemMap,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn prefix_keys(data: &BTreeMap<Bytes, Bytes>, prefix: &Bytes) -> Vec<Bytes> {
        data.range::<Bytes, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// Forward cursor over one prefix. The read lock is only held while the next
/// chunk is copied out, so a long scan never blocks writers.
struct MemScan {
    data: MemMap,
    prefix: Bytes,
    cursor: Bound<Bytes>,
    pending: VecDeque<(Bytes, Bytes)>,
    done: bool,
}

impl MemScan {
    fn refill(&mut self) {
        let data = self.data.read();
        let prefix = &self.prefix;
        self.pending.extend(
            data.range::<Bytes, _>((self.cursor.clone(), Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(prefix))
                .take(MEM_SCAN_CHUNK)
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        self.done = self.pending.len() < MEM_SCAN_CHUNK;
        if let Some((k, _)) = self.pending.back() {
            self.cursor = Bound::Excluded(k.clone());
        }
    }
}

impl Iterator for MemScan {
    type Item = Result<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending.is_empty() && !self.done {
            self.refill();
        }
        self.pending.pop_front().map(Ok)
    }
}

impl KvStore for MemStore {
    fn kv_delete_prefix(&self, prefix: Bytes) -> Result<usize> {
        let mut data = self.data.write();
        let keys = Self::prefix_keys(&data, &prefix);
        for k in keys.iter() {
            data.remove(k);
        }

        Ok(keys.len())
    }

    fn kv_write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut data = self.data.write();
        data.extend(batch.into_items());
        Ok(())
    }

    fn kv_scan(&self, prefix: Bytes) -> Result<KvIter> {
        Ok(Box::new(MemScan {
            data: self.data.clone(),
            cursor: Bound::Included(prefix.clone()),
            prefix,
            pending: VecDeque::new(),
            done: false,
        }))
    }

    fn kv_flush(&self) -> Result<()> {
        Ok(())
    }
}
