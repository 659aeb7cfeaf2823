use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use dedupserver::kv_store::{KvIter, KvStore, MemStore, WriteBatch};
use dedupserver::store::{
    AccessState, BackendRegistry, Phase, Store, StoreError, MEMORY, SCAN_BATCH_SIZE, SLED,
};

const BASIC: &str = "hello\nwoot\nwoot\nnope\n";
const BASIC_RESULT: &str = "hello\nnope\nwoot\n";

async fn write_str(store: &Store, prefix: &str, input: &str) -> Result<(), StoreError> {
    store
        .write(prefix, input.as_bytes(), &CancellationToken::new())
        .await
}

async fn read_string(store: &Store, prefix: &str) -> String {
    let mut out = Vec::new();
    store
        .read(prefix, &mut out, &CancellationToken::new())
        .await
        .unwrap();
    String::from_utf8(out).unwrap()
}

/// Runs `check` against a fresh store of every built-in kind.
async fn for_each_backend<F, Fut>(check: F)
where
    F: Fn(Store) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let registry = BackendRegistry::with_defaults();
    for kind in [MEMORY, SLED] {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&registry, kind, dir.path()).unwrap();
        assert_eq!(store.kind(), kind);
        check(store).await;
    }
}

#[tokio::test]
async fn test_basic() {
    for_each_backend(|store| async move {
        write_str(&store, "testing", BASIC).await.unwrap();
        assert_eq!(read_string(&store, "testing").await, BASIC_RESULT);
    })
    .await;
}

#[tokio::test]
async fn test_dedup_sorted() {
    for_each_backend(|store| async move {
        write_str(&store, "p", "a\nb\nb\nc\n").await.unwrap();
        assert_eq!(read_string(&store, "p").await, "a\nb\nc\n");
    })
    .await;
}

#[tokio::test]
async fn test_replace_semantics() {
    for_each_backend(|store| async move {
        write_str(&store, "p", "x\ny\n").await.unwrap();
        write_str(&store, "p", "z\n").await.unwrap();
        assert_eq!(read_string(&store, "p").await, "z\n");

        write_str(&store, "p", "").await.unwrap();
        assert_eq!(read_string(&store, "p").await, "");
    })
    .await;
}

#[tokio::test]
async fn test_different_prefix() {
    for_each_backend(|store| async move {
        write_str(&store, "testing", BASIC).await.unwrap();
        write_str(&store, "other", "q\n").await.unwrap();

        assert_eq!(read_string(&store, "differentPrefix").await, "");
        assert_eq!(read_string(&store, "testing").await, BASIC_RESULT);
        assert_eq!(read_string(&store, "other").await, "q\n");
    })
    .await;
}

#[tokio::test]
async fn test_separator_in_prefix() {
    for_each_backend(|store| async move {
        write_str(&store, "a", "b:c\n").await.unwrap();
        write_str(&store, "a:b", "c\n").await.unwrap();
        write_str(&store, "a:", "x\n").await.unwrap();

        assert_eq!(read_string(&store, "a").await, "b:c\n");
        assert_eq!(read_string(&store, "a:b").await, "c\n");
        assert_eq!(read_string(&store, "a:").await, "x\n");
    })
    .await;
}

#[tokio::test]
async fn test_line_endings() {
    for_each_backend(|store| async move {
        // crlf is stripped, a last line without newline still counts
        write_str(&store, "p", "b\r\na\n\nb\nc").await.unwrap();
        assert_eq!(read_string(&store, "p").await, "\na\nb\nc\n");
    })
    .await;
}

#[tokio::test]
async fn test_idempotent_write() {
    for_each_backend(|store| async move {
        write_str(&store, "p", BASIC).await.unwrap();
        let first = read_string(&store, "p").await;
        write_str(&store, "p", BASIC).await.unwrap();
        assert_eq!(read_string(&store, "p").await, first);
    })
    .await;
}

#[tokio::test]
async fn test_round_trip_many_batches() {
    for_each_backend(|store| async move {
        let mut seed: u64 = 0x2545f4914f6cdd1d;
        let mut expected = BTreeSet::new();
        let mut input = String::new();

        for _ in 0..(SCAN_BATCH_SIZE * 4) {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let line = format!("line-{}", seed % 700);
            input.push_str(&line);
            input.push('\n');
            expected.insert(line);
        }

        write_str(&store, "rt", &input).await.unwrap();

        let want: String = expected.iter().map(|l| format!("{l}\n")).collect();
        assert_eq!(read_string(&store, "rt").await, want);
    })
    .await;
}

#[tokio::test]
async fn test_sled_survives_reopen() {
    let registry = BackendRegistry::with_defaults();
    let dir = tempfile::tempdir().unwrap();

    {
        let store = Store::open(&registry, SLED, dir.path()).unwrap();
        write_str(&store, "testing", BASIC).await.unwrap();
        store.close().unwrap();
    }

    let store = Store::open(&registry, SLED, dir.path()).unwrap();
    assert_eq!(read_string(&store, "testing").await, BASIC_RESULT);
}

#[tokio::test]
async fn test_write_conflicts_while_writing() {
    let store = Store::open(&BackendRegistry::with_defaults(), MEMORY, ".").unwrap();
    let (mut tx, rx) = tokio::io::duplex(64);

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .write("p", BufReader::new(rx), &CancellationToken::new())
                .await
        })
    };

    tx.write_all(b"b\na\n").await.unwrap();
    while store.access_state("p") != AccessState::Writing {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(matches!(
        write_str(&store, "p", "x\n").await,
        Err(StoreError::AlreadyWriting)
    ));
    let mut out = Vec::<u8>::new();
    assert!(matches!(
        store.read("p", &mut out, &CancellationToken::new()).await,
        Err(StoreError::AlreadyWriting)
    ));
    assert!(out.is_empty());

    // other prefixes are unaffected
    write_str(&store, "q", "x\n").await.unwrap();

    drop(tx);
    writer.await.unwrap().unwrap();

    assert_eq!(store.access_state("p"), AccessState::NoAccess);
    assert_eq!(read_string(&store, "p").await, "a\nb\n");
}

#[tokio::test]
async fn test_read_conflicts_while_reading() {
    let store = Store::open(&BackendRegistry::with_defaults(), MEMORY, ".").unwrap();
    let input: String = (0..1000).map(|i| format!("{i:04}\n")).collect();
    write_str(&store, "p", &input).await.unwrap();

    // A tiny sink that nobody drains keeps the first read in flight.
    let (sink, mut source) = tokio::io::duplex(8);
    let reader = {
        let store = store.clone();
        tokio::spawn(async move { store.read("p", sink, &CancellationToken::new()).await })
    };

    while store.access_state("p") != AccessState::Reading {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let mut out = Vec::<u8>::new();
    assert!(matches!(
        store.read("p", &mut out, &CancellationToken::new()).await,
        Err(StoreError::AlreadyReading)
    ));
    assert!(matches!(
        write_str(&store, "p", "x\n").await,
        Err(StoreError::AlreadyReading)
    ));

    let mut streamed = String::new();
    source.read_to_string(&mut streamed).await.unwrap();
    reader.await.unwrap().unwrap();

    assert_eq!(streamed, input);
    assert_eq!(store.access_state("p"), AccessState::NoAccess);
}

#[tokio::test]
async fn test_cancel_mid_write() {
    let store = Store::open(&BackendRegistry::with_defaults(), MEMORY, ".").unwrap();
    write_str(&store, "p", "old-1\nold-2\n").await.unwrap();

    let (mut tx, rx) = tokio::io::duplex(64);
    let cancel = CancellationToken::new();

    let writer = {
        let store = store.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { store.write("p", BufReader::new(rx), &cancel).await })
    };

    tx.write_all(b"new-1\nnew-2\n").await.unwrap();
    while store.access_state("p") != AccessState::Writing {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    cancel.cancel();

    assert!(matches!(
        writer.await.unwrap(),
        Err(StoreError::Cancelled)
    ));
    assert_eq!(store.access_state("p"), AccessState::NoAccess);

    // old content was cleared and nothing of the new batch was committed
    assert_eq!(read_string(&store, "p").await, "");
}

#[tokio::test]
async fn test_cancelled_read() {
    let store = Store::open(&BackendRegistry::with_defaults(), MEMORY, ".").unwrap();
    write_str(&store, "p", BASIC).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut out = Vec::<u8>::new();
    assert!(matches!(
        store.read("p", &mut out, &cancel).await,
        Err(StoreError::Cancelled)
    ));
    assert!(out.is_empty());
    assert_eq!(store.access_state("p"), AccessState::NoAccess);
}

/// Memory engine whose batch commits and scans fail.
#[derive(Default)]
struct BrokenStore {
    inner: MemStore,
}

impl KvStore for BrokenStore {
    fn kv_delete_prefix(&self, prefix: Bytes) -> Result<usize> {
        self.inner.kv_delete_prefix(prefix)
    }

    fn kv_write_batch(&self, _batch: WriteBatch) -> Result<()> {
        bail!("disk full")
    }

    fn kv_scan(&self, _prefix: Bytes) -> Result<KvIter> {
        bail!("corrupted")
    }

    fn kv_flush(&self) -> Result<()> {
        Ok(())
    }
}

fn open_broken(_dir: &Path) -> Result<Arc<dyn KvStore>> {
    Ok(Arc::new(BrokenStore::default()))
}

#[tokio::test]
async fn test_engine_failures_release_slot() {
    let mut registry = BackendRegistry::with_defaults();
    registry.register("broken", open_broken);
    let store = Store::open(&registry, "broken", ".").unwrap();

    let res = write_str(&store, "p", BASIC).await;
    assert!(matches!(
        res,
        Err(StoreError::Engine {
            phase: Phase::FlushBatch,
            ..
        })
    ));
    assert_eq!(store.access_state("p"), AccessState::NoAccess);

    let res = store
        .read("p", Vec::<u8>::new(), &CancellationToken::new())
        .await;
    assert!(matches!(
        res,
        Err(StoreError::Engine {
            phase: Phase::Scan,
            ..
        })
    ));
    assert_eq!(store.access_state("p"), AccessState::NoAccess);

    // nothing staged, nothing to commit
    write_str(&store, "p", "").await.unwrap();
}

/// Memory engine whose scans yield one entry and then fail.
#[derive(Default)]
struct FlakyScanStore {
    inner: MemStore,
}

impl KvStore for FlakyScanStore {
    fn kv_delete_prefix(&self, prefix: Bytes) -> Result<usize> {
        self.inner.kv_delete_prefix(prefix)
    }

    fn kv_write_batch(&self, batch: WriteBatch) -> Result<()> {
        self.inner.kv_write_batch(batch)
    }

    fn kv_scan(&self, prefix: Bytes) -> Result<KvIter> {
        let first = self.inner.kv_scan(prefix)?.take(1);
        Ok(Box::new(first.chain(std::iter::once(Err(anyhow::anyhow!("io error"))))))
    }

    fn kv_flush(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_scan_failure_mid_read() {
    let store = Store::with_engine("flaky", Arc::new(FlakyScanStore::default()));
    write_str(&store, "p", "b\na\n").await.unwrap();

    let mut out = Vec::<u8>::new();
    let res = store.read("p", &mut out, &CancellationToken::new()).await;
    assert!(matches!(
        res,
        Err(StoreError::Engine {
            phase: Phase::Scan,
            ..
        })
    ));
    // the failing batch is never written out
    assert!(out.is_empty());
    assert_eq!(store.access_state("p"), AccessState::NoAccess);
}

#[tokio::test]
async fn test_unsupported_backend() {
    let res = Store::open(&BackendRegistry::with_defaults(), "badger", ".");
    assert!(matches!(res, Err(StoreError::UnsupportedBackend(kind)) if kind == "badger"));
}
