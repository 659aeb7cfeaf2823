use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::kv_store::{KvStore, WriteBatch};

use super::access_guard::SlotGuard;
use super::{key, Phase, StoreError};

/// Replaces the content of the prefix held by `slot` with the distinct lines
/// of `input`. The old entries are removed before the new batch is committed,
/// so a failure after the clear leaves the prefix empty.
pub(crate) async fn write_prefix<R>(
    engine: &dyn KvStore,
    slot: SlotGuard,
    input: R,
    cancel: &CancellationToken,
) -> Result<(), StoreError>
where
    R: AsyncBufRead + Unpin,
{
    let prefix = slot.prefix();
    let scope = key::scope_key(prefix);

    let removed = engine
        .kv_delete_prefix(scope.clone())
        .map_err(|e| StoreError::engine(Phase::ClearPrefix, e))?;
    debug!("cleared {removed} entries of prefix {prefix}");

    let mut batch = WriteBatch::new();
    let mut lines = input.split(b'\n');

    loop {
        let segment = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("write to prefix {prefix} cancelled, discard {} staged entries", batch.len());
                return Err(StoreError::Cancelled);
            }
            segment = lines.next_segment() => segment,
        };

        let Some(mut line) = segment.map_err(|e| StoreError::io(Phase::ReadInput, e))? else {
            break;
        };
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        let line = Bytes::from(line);
        batch.set(key::entry_key(&scope, &line), line);
    }

    if batch.is_empty() {
        info!("prefix {prefix} cleared by empty input");
        return Ok(());
    }

    let staged = batch.len();
    engine
        .kv_write_batch(batch)
        .map_err(|e| StoreError::engine(Phase::FlushBatch, e))?;

    info!("wrote {staged} lines to prefix {prefix}");
    Ok(())
}
