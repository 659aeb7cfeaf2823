use thiserror::Error;

#[derive(Error, Debug)]
pub enum DedupServerError {
    #[error("invalid toml")]
    InvalidToml,
    #[error("failed to read file")]
    FailedToRead,
    #[error("invalid listen address: {0}")]
    InvalidListenAddr(String),
    #[error("empty data directory")]
    EmptyDataDirectory,
    #[error("path is not a directory: {0}")]
    NotADirectory(String),
    #[error("failed to bind listener")]
    FailedToBind,
}
