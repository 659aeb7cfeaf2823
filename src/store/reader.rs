use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::kv_store::{KvIter, KvStore};

use super::{key, Phase, StoreError};

pub const SCAN_BATCH_SIZE: usize = 256;

/// Sorted scan over one prefix, pulled in batches of [`SCAN_BATCH_SIZE`]
/// entries. Opening it already talks to the engine, so a broken engine is
/// reported before any output exists.
pub(crate) struct PrefixScan {
    iter: KvIter,
    total: usize,
}

impl PrefixScan {
    pub(crate) fn open(engine: &dyn KvStore, prefix: &str) -> Result<Self, StoreError> {
        let iter = engine
            .kv_scan(key::scope_key(prefix))
            .map_err(|e| StoreError::engine(Phase::Scan, e))?;

        Ok(Self { iter, total: 0 })
    }

    /// Lines emitted so far.
    pub(crate) fn total(&self) -> usize {
        self.total
    }

    /// The next batch of newline-terminated lines, `None` once the prefix is
    /// exhausted.
    pub(crate) fn next_batch(&mut self) -> Result<Option<Bytes>, StoreError> {
        let mut buf = BytesMut::new();
        let mut count = 0;

        for item in self.iter.by_ref().take(SCAN_BATCH_SIZE) {
            let (_, value) = item.map_err(|e| StoreError::engine(Phase::Scan, e))?;
            buf.extend_from_slice(&value);
            buf.put_u8(b'\n');
            count += 1;
        }

        if count == 0 {
            return Ok(None);
        }

        self.total += count;
        Ok(Some(buf.freeze()))
    }
}

/// Writes `buf` completely, failing if the sink stops accepting bytes.
pub(crate) async fn write_checked<W>(sink: &mut W, buf: &[u8]) -> Result<(), StoreError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < buf.len() {
        let n = sink
            .write(&buf[written..])
            .await
            .map_err(|e| StoreError::io(Phase::WriteSink, e))?;
        if n == 0 {
            return Err(StoreError::ShortWrite {
                written,
                expected: buf.len(),
            });
        }
        written += n;
    }

    Ok(())
}
