use std::path::Path;

use anyhow::Result;
use bytes::Bytes;
use sled;
use tracing::{debug, info};

use super::{KvIter, KvStore, WriteBatch};

pub struct SledStore {
    pub db: sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        info!("open sledkv db at {:?}", path.as_ref());

        let db = sled::open(path.as_ref())?;
        Ok(Self { db })
    }
}

impl Clone for SledStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

fn to_bytes(v: sled::IVec) -> Bytes {
    Bytes::copy_from_slice(v.as_ref())
}

impl KvStore for SledStore {
    fn kv_delete_prefix(&self, prefix: Bytes) -> Result<usize> {
        let mut batch = sled::Batch::default();
        let mut count = 0;

        for item in self.db.scan_prefix(&prefix).keys() {
            batch.remove(item?);
            count += 1;
        }

        self.db.apply_batch(batch)?;
        debug!("removed {count} keys with prefix {:?}", prefix);

        Ok(count)
    }

    fn kv_write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut b = sled::Batch::default();
        for (key, value) in batch.into_items() {
            b.insert(key.as_ref(), value.as_ref());
        }

        self.db.apply_batch(b)?;
        Ok(())
    }

    fn kv_scan(&self, prefix: Bytes) -> Result<KvIter> {
        let iter = self
            .db
            .scan_prefix(prefix)
            .map(|x| x.map(|(k, v)| (to_bytes(k), to_bytes(v))).map_err(anyhow::Error::from));

        Ok(Box::new(iter))
    }

    fn kv_flush(&self) -> Result<()> {
        let n = self.db.flush()?;
        debug!("flushed {n} bytes to disk");
        Ok(())
    }
}
