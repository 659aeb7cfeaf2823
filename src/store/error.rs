use std::fmt;

use thiserror::Error;

/// Which step of a store operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ClearPrefix,
    ReadInput,
    FlushBatch,
    Scan,
    WriteSink,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::ClearPrefix => "clear existing prefix",
            Phase::ReadInput => "read input stream",
            Phase::FlushBatch => "flush write batch",
            Phase::Scan => "scan prefix",
            Phase::WriteSink => "write to sink",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("already writing")]
    AlreadyWriting,
    #[error("already reading")]
    AlreadyReading,

    #[error("operation cancelled")]
    Cancelled,

    #[error("empty prefix")]
    EmptyPrefix,
    #[error("prefix too long: {0} bytes")]
    PrefixTooLong(usize),

    #[error("unimplemented store kind supplied: {0}")]
    UnsupportedBackend(String),
    #[error("failed to open {kind} store")]
    Open {
        kind: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to {phase}")]
    Engine {
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to {phase}")]
    Io {
        phase: Phase,
        #[source]
        source: std::io::Error,
    },
    #[error("short write to sink: {written} of {expected} bytes written")]
    ShortWrite { written: usize, expected: usize },
}

impl StoreError {
    pub fn engine(phase: Phase, source: anyhow::Error) -> Self {
        StoreError::Engine { phase, source }
    }

    pub fn io(phase: Phase, source: std::io::Error) -> Self {
        StoreError::Io { phase, source }
    }

    /// Another operation holds the prefix; the caller may retry later.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::AlreadyWriting | StoreError::AlreadyReading)
    }

    /// The request itself is malformed, independent of store state.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, StoreError::EmptyPrefix | StoreError::PrefixTooLong(_))
    }
}
