use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::kv_store::{KvStore, MemStore, SledStore};

use super::StoreError;

/// Durable sled backed store kind.
pub const SLED: &str = "sled";
/// In-process store kind, nothing is written to the directory.
pub const MEMORY: &str = "memory";

pub type BackendFactory = fn(&Path) -> Result<Arc<dyn KvStore>>;

/// Store kinds known to the process, built once at start-up and handed to
/// [`super::Store::open`].
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

fn open_sled(dir: &Path) -> Result<Arc<dyn KvStore>> {
    Ok(Arc::new(SledStore::open(dir)?))
}

fn open_memory(_dir: &Path) -> Result<Arc<dyn KvStore>> {
    Ok(Arc::new(MemStore::new()))
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(SLED, open_sled).register(MEMORY, open_memory);
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: BackendFactory) -> &mut Self {
        self.factories.insert(kind.into(), factory);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub(crate) fn create(&self, kind: &str, dir: &Path) -> Result<Arc<dyn KvStore>, StoreError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| StoreError::UnsupportedBackend(kind.to_owned()))?;

        factory(dir).map_err(|source| StoreError::Open {
            kind: kind.to_owned(),
            source,
        })
    }
}
