use std::fs::read_to_string;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use serde::{self, Deserialize};
use tracing::{debug, error, info};

use crate::error::DedupServerError;
use crate::store::{BackendRegistry, SLED};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DATA_DIRECTORY: &str = "./dist/db";
pub const DEFAULT_STREAM_QUEUE_DEPTH: usize = 16;

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_owned()
}

fn default_data_directory() -> String {
    DEFAULT_DATA_DIRECTORY.to_owned()
}

fn default_store_kind() -> String {
    SLED.to_owned()
}

fn default_stream_queue_depth() -> usize {
    DEFAULT_STREAM_QUEUE_DEPTH
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Configuration {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
    #[serde(default = "default_store_kind")]
    pub store_kind: String,

    // scan batches buffered between a read and the http response body
    #[serde(default = "default_stream_queue_depth")]
    pub stream_queue_depth: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            data_directory: default_data_directory(),
            store_kind: default_store_kind(),
            stream_queue_depth: default_stream_queue_depth(),
        }
    }
}

impl Configuration {
    pub fn parse_config_file(file: impl AsRef<Path>) -> Result<Configuration> {
        let file = file.as_ref();
        info!("parsing configuration file: {:?}", file);

        let file_contents = read_to_string(file).map_err(|e| {
            error!("failed to read configuration file {:?}, err: {e}", file);
            anyhow!(DedupServerError::FailedToRead)
        })?;

        let ret = Self::parse_config_str(&file_contents)?;

        debug!("configuration: {:?}", ret);
        Ok(ret)
    }

    pub fn parse_config_str(contents: &str) -> Result<Configuration> {
        toml::from_str(contents).map_err(|e| {
            error!("failed to parse configuration file: {}", e);
            anyhow!(DedupServerError::InvalidToml)
        })
    }

    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|_| anyhow!(DedupServerError::InvalidListenAddr(self.listen_addr.clone())))
    }
}

pub fn validate_configuration(config: &Configuration, registry: &BackendRegistry) -> Result<()> {
    config.listen_socket_addr()?;

    if config.data_directory.is_empty() {
        bail!(DedupServerError::EmptyDataDirectory);
    }

    let dir = Path::new(&config.data_directory);
    if dir.exists() && !dir.is_dir() {
        bail!(DedupServerError::NotADirectory(config.data_directory.clone()));
    }

    if !registry.contains(&config.store_kind) {
        bail!(
            "unsupported store kind {}, available: {:?}",
            config.store_kind,
            registry.kinds()
        );
    }

    if config.stream_queue_depth == 0 {
        bail!("stream_queue_depth must be positive");
    }

    Ok(())
}
