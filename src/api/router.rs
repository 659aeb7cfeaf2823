//! Request routing for the file API.

use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{Method, Request, Response};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use super::response::{self, ApiBody};
use super::AppState;

/// Route prefix for file endpoints.
const FILE_PREFIX: &str = "/v1/file";

const FILE_METHODS: &[&str] = &["GET", "PUT"];

/// Extracts the file id from `/v1/file/{id}` (a trailing `/` is accepted).
/// `Some("")` means the route matched but the id is missing.
fn parse_file_id(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(FILE_PREFIX)?;
    if rest.is_empty() {
        return Some("");
    }

    let rest = rest.strip_prefix('/')?;
    let id = rest.strip_suffix('/').unwrap_or(rest);
    if id.contains('/') {
        return None;
    }

    Some(id)
}

/// Route an incoming request to the matching handler.
pub async fn route<B>(req: Request<B>, state: Arc<AppState>) -> Result<Response<ApiBody>, Infallible>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    debug!("routing request {} {}", method, req.uri().path());

    let Some(file_id) = parse_file_id(req.uri().path()).map(str::to_owned) else {
        return Ok(response::not_found());
    };

    let response = match method {
        Method::PUT | Method::GET if file_id.is_empty() => response::bad_request("missing fileID"),
        Method::PUT => put_file(req, &state, &file_id).await,
        Method::GET => get_file(&state, &file_id),
        _ => response::method_not_allowed(FILE_METHODS),
    };

    Ok(response)
}

/// PUT /v1/file/{id}
///
/// Replaces the stored lines of `id` with the lines of the request body.
async fn put_file<B>(req: Request<B>, state: &AppState, file_id: &str) -> Response<ApiBody>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = req.into_body().into_data_stream().map_err(io::Error::other);
    let reader = StreamReader::new(body);
    tokio::pin!(reader);

    let cancel = state.shutdown.child_token();
    if let Err(e) = state.store.write(file_id, reader, &cancel).await {
        return response::from_store_error(&e);
    }

    info!("stored file {file_id}");
    response::no_content()
}

/// GET /v1/file/{id}
///
/// Streams the sorted unique lines of `id`. The read slot is taken and the
/// scan opened before answering, so conflicts get a 423 and a broken engine a
/// 500. A failure after that aborts the body.
fn get_file(state: &AppState, file_id: &str) -> Response<ApiBody> {
    let mut session = match state.store.begin_read(file_id) {
        Ok(session) => session,
        Err(e) => return response::from_store_error(&e),
    };

    let (tx, rx) = mpsc::channel(state.stream_queue_depth);
    let cancel = state.shutdown.child_token();

    tokio::spawn(async move {
        loop {
            match session.next_chunk(&cancel) {
                Ok(Some(chunk)) => {
                    if tx.send(Ok(chunk)).await.is_err() {
                        debug!("client of file {} went away", session.prefix());
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("failed to stream file {} to client, err: {e:?}", session.prefix());
                    let _ = tx.send(Err(io::Error::other(e))).await;
                    break;
                }
            }
        }

        // release the prefix before the body ends
        drop(session);
        drop(tx);
    });

    response::stream(rx)
}
