//! HTTP server setup and connection handling.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{router, AppState};
use crate::error::DedupServerError;
use crate::store::Store;

pub struct ApiServer {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl ApiServer {
    pub async fn bind(
        addr: SocketAddr,
        store: Store,
        stream_queue_depth: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("failed to bind {addr}, err: {e}");
            anyhow!(DedupServerError::FailedToBind)
        })?;

        let state = AppState::new(store, stream_queue_depth, CancellationToken::new());
        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Cancelling the returned token stops the accept loop and cancels
    /// in-flight store operations.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    pub async fn run(self) -> Result<()> {
        let shutdown = self.state.shutdown.clone();
        info!("listening on: {}", self.local_addr()?);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    let (stream, remote_addr) = match result {
                        Ok(v) => v,
                        Err(e) => {
                            warn!("failed to accept connection, err: {e}");
                            continue;
                        }
                    };

                    let io = TokioIo::new(stream);
                    let state = Arc::clone(&self.state);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { router::route(req, state).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            if !e.is_incomplete_message() {
                                warn!("http connection error, remote: {remote_addr}, err: {e}");
                            }
                        }
                    });
                }
                _ = shutdown.cancelled() => {
                    info!("api server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
