//! HTTP front end of the store.
//!
//! - `PUT /v1/file/{id}` replaces the lines stored under `id`
//! - `GET /v1/file/{id}` streams them back, de-duplicated and sorted

pub mod response;
pub mod router;
mod server;

use tokio_util::sync::CancellationToken;

use crate::store::Store;

pub use server::ApiServer;

/// Shared by every request handler.
#[derive(Debug)]
pub struct AppState {
    pub store: Store,
    pub stream_queue_depth: usize,
    /// Cancelled when the server shuts down; requests run on child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(store: Store, stream_queue_depth: usize, shutdown: CancellationToken) -> Self {
        Self {
            store,
            stream_queue_depth,
            shutdown,
        }
    }
}
