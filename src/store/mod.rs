mod access_guard;
mod error;
mod key;
mod reader;
mod registry;
mod writer;

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use derivative::Derivative;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::kv_store::KvStore;
use reader::PrefixScan;

pub use access_guard::{AccessGuard, AccessMode, AccessState, SlotGuard};
pub use error::{Phase, StoreError};
pub use key::validate_prefix;
pub use reader::SCAN_BATCH_SIZE;
pub use registry::{BackendFactory, BackendRegistry, MEMORY, SLED};

#[derive(Derivative)]
#[derivative(Debug)]
struct StoreInner {
    kind: String,
    #[derivative(Debug = "ignore")]
    engine: Arc<dyn KvStore>,
    #[derivative(Debug = "ignore")]
    access: AccessGuard,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Err(e) = self.engine.kv_flush() {
            error!("failed to flush {} store on close, err: {e}", self.kind);
        }
    }
}

/// De-duplicating line store partitioned by prefix.
///
/// A write replaces everything stored under its prefix with the distinct
/// lines of the input; a read streams those lines back sorted. At most one
/// read or write may run on a prefix at a time, a second one fails with
/// [`StoreError::AlreadyReading`] or [`StoreError::AlreadyWriting`].
///
/// Clones share the same engine. The engine is flushed when the last clone
/// is dropped.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn open(
        registry: &BackendRegistry,
        kind: &str,
        dir: impl AsRef<Path>,
    ) -> Result<Self, StoreError> {
        info!("open {kind} store at {:?}", dir.as_ref());
        let engine = registry
            .create(kind, dir.as_ref())
            .inspect_err(|e| error!("failed to create new store, err: {e}"))?;

        Ok(Self::with_engine(kind, engine))
    }

    pub fn with_engine(kind: impl Into<String>, engine: Arc<dyn KvStore>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                kind: kind.into(),
                engine,
                access: AccessGuard::new(),
            }),
        }
    }

    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    pub fn access_state(&self, prefix: &str) -> AccessState {
        self.inner.access.state(prefix)
    }

    fn acquire(&self, prefix: &str, mode: AccessMode) -> Result<SlotGuard, StoreError> {
        validate_prefix(prefix)?;
        self.inner.access.acquire(prefix, mode)
    }

    /// Replaces the content of `prefix` with the distinct lines of `input`.
    ///
    /// On failure the prefix content is undefined (possibly empty) and should
    /// be rewritten.
    pub async fn write<R>(
        &self,
        prefix: &str,
        input: R,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>
    where
        R: AsyncBufRead + Unpin,
    {
        let slot = self.acquire(prefix, AccessMode::Write)?;
        writer::write_prefix(self.inner.engine.as_ref(), slot, input, cancel).await
    }

    /// Streams the sorted distinct lines of `prefix` to `sink`, each followed
    /// by a newline. An unknown prefix produces no output.
    pub async fn read<W>(
        &self,
        prefix: &str,
        sink: W,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>
    where
        W: AsyncWrite + Unpin,
    {
        self.begin_read(prefix)?.stream_to(sink, cancel).await
    }

    /// Takes the read slot of `prefix` and opens the scan now, streaming
    /// later. Conflicts and engine failures are known before any output is
    /// produced.
    pub fn begin_read(&self, prefix: &str) -> Result<ReadSession, StoreError> {
        let slot = self.acquire(prefix, AccessMode::Read)?;
        let scan = PrefixScan::open(self.inner.engine.as_ref(), slot.prefix())?;
        Ok(ReadSession { scan, slot })
    }

    pub fn close(&self) -> Result<(), StoreError> {
        info!("flush {} store", self.inner.kind);
        self.inner
            .engine
            .kv_flush()
            .map_err(|e| StoreError::engine(Phase::FlushBatch, e))
    }
}

/// A held read slot with its open scan. Dropping it releases the prefix.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ReadSession {
    #[derivative(Debug = "ignore")]
    scan: PrefixScan,
    slot: SlotGuard,
}

impl ReadSession {
    pub fn prefix(&self) -> &str {
        self.slot.prefix()
    }

    /// Pulls the next batch of newline-terminated lines. Cancellation is
    /// checked once per batch.
    pub fn next_chunk(&mut self, cancel: &CancellationToken) -> Result<Option<Bytes>, StoreError> {
        if cancel.is_cancelled() {
            warn!(
                "read of prefix {} cancelled after {} lines",
                self.prefix(),
                self.scan.total()
            );
            return Err(StoreError::Cancelled);
        }

        self.scan.next_batch()
    }

    /// Writes every remaining line to `sink`, then flushes it.
    pub async fn stream_to<W>(
        mut self,
        mut sink: W,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(chunk) = self.next_chunk(cancel)? {
            reader::write_checked(&mut sink, &chunk).await?;
        }

        sink.flush()
            .await
            .map_err(|e| StoreError::io(Phase::WriteSink, e))?;

        debug!("read {} lines from prefix {}", self.scan.total(), self.prefix());
        Ok(())
    }
}
