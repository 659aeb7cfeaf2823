use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use derivative::Derivative;
use tracing::debug;

use super::StoreError;

const NO_ACCESS: u8 = 0;
const READING: u8 = 1;
const WRITING: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

impl AccessMode {
    fn token(&self) -> u8 {
        match self {
            AccessMode::Read => READING,
            AccessMode::Write => WRITING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    NoAccess,
    Reading,
    Writing,
}

impl From<u8> for AccessState {
    fn from(value: u8) -> Self {
        match value {
            READING => AccessState::Reading,
            WRITING => AccessState::Writing,
            _ => AccessState::NoAccess,
        }
    }
}

type Slots = Arc<DashMap<String, Arc<AtomicU8>>>;

/// Per-prefix exclusive access. A prefix is held by at most one operation,
/// read or write; a conflicting acquire fails instead of waiting.
///
/// Entries only live while some operation holds or contends for them, the
/// last release removes the entry again.
#[derive(Default)]
pub struct AccessGuard {
    slots: Slots,
}

impl AccessGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, prefix: &str) -> Arc<AtomicU8> {
        let existing = self.slots.get(prefix).map(|s| Arc::clone(s.value()));
        existing.unwrap_or_else(|| {
            Arc::clone(self.slots.entry(prefix.to_owned()).or_default().value())
        })
    }

    pub fn acquire(&self, prefix: &str, mode: AccessMode) -> Result<SlotGuard, StoreError> {
        let slot = self.slot(prefix);

        match slot.compare_exchange(NO_ACCESS, mode.token(), Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                debug!("acquired {:?} slot for prefix {prefix}", mode);
                Ok(SlotGuard {
                    slots: Arc::clone(&self.slots),
                    slot,
                    mode,
                    prefix: prefix.to_owned(),
                })
            }
            Err(current) => {
                // the holder may have released in between, leaving an idle entry
                drop(slot);
                self.slots.remove_if(prefix, |_, s| {
                    Arc::strong_count(s) == 1 && s.load(Ordering::Acquire) == NO_ACCESS
                });

                match current {
                    WRITING => Err(StoreError::AlreadyWriting),
                    _ => Err(StoreError::AlreadyReading),
                }
            }
        }
    }

    pub fn state(&self, prefix: &str) -> AccessState {
        self.slots
            .get(prefix)
            .map(|s| s.load(Ordering::Acquire).into())
            .unwrap_or(AccessState::NoAccess)
    }
}

/// A held slot. Dropping it releases the prefix.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SlotGuard {
    #[derivative(Debug = "ignore")]
    slots: Slots,
    slot: Arc<AtomicU8>,
    mode: AccessMode,
    prefix: String,
}

impl SlotGuard {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slot.store(NO_ACCESS, Ordering::Release);

        // Removable once only the map and this guard reference the slot.
        // Lookups clone under the shard lock that remove_if holds.
        self.slots.remove_if(&self.prefix, |_, s| {
            Arc::ptr_eq(s, &self.slot) && Arc::strong_count(s) == 2
        });

        debug!("released {:?} slot for prefix {}", self.mode, self.prefix);
    }
}
