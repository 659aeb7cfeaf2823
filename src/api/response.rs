//! Plain text response builders.

use std::convert::Infallible;
use std::io;

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::store::StoreError;

pub type ApiBody = UnsyncBoxBody<Bytes, io::Error>;

const TEXT_PLAIN: &str = "text/plain";

const BAD_REQUEST: &str = "Bad Request";
const INTERNAL_ERROR: &str = "Internal Error";
const LOCKED_ERROR: &str = "Resource Locked";
const NOT_FOUND: &str = "Not Found";
const METHOD_NOT_ALLOWED: &str = "Method Not Allowed";

fn full_body(body: impl Into<Bytes>) -> ApiBody {
    Full::new(body.into())
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

fn with_status(status: StatusCode, body: ApiBody) -> Response<ApiBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
}

pub fn text(status: StatusCode, message: impl Into<Bytes>) -> Response<ApiBody> {
    with_status(status, full_body(message))
}

/// 204, the body of a PUT was stored.
pub fn no_content() -> Response<ApiBody> {
    let mut response = Response::new(full_body(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// 200 whose body is every chunk received until the sender goes away. An
/// `Err` chunk aborts the body, the client sees a broken transfer instead of
/// a complete one.
pub fn stream(mut chunks: mpsc::Receiver<io::Result<Bytes>>) -> Response<ApiBody> {
    let frames = futures_util::stream::poll_fn(move |cx| chunks.poll_recv(cx));
    let body = StreamBody::new(frames.map_ok(Frame::data)).boxed_unsync();
    with_status(StatusCode::OK, body)
}

pub fn bad_request(reason: &str) -> Response<ApiBody> {
    text(StatusCode::BAD_REQUEST, format!("{BAD_REQUEST}: {reason}"))
}

pub fn locked() -> Response<ApiBody> {
    text(StatusCode::LOCKED, LOCKED_ERROR)
}

pub fn internal_error() -> Response<ApiBody> {
    text(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
}

pub fn not_found() -> Response<ApiBody> {
    text(StatusCode::NOT_FOUND, NOT_FOUND)
}

pub fn method_not_allowed(allowed: &[&str]) -> Response<ApiBody> {
    let mut response = text(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED);
    if let Ok(v) = HeaderValue::from_str(&allowed.join(", ")) {
        response.headers_mut().insert(header::ALLOW, v);
    }
    response
}

/// Maps a failed store operation onto a status code.
pub fn from_store_error(e: &StoreError) -> Response<ApiBody> {
    if e.is_conflict() {
        warn!("already reading/writing to the given prefix, err: {e}");
        return locked();
    }

    if e.is_invalid_request() {
        warn!("rejected request, err: {e}");
        return bad_request(&e.to_string());
    }

    error!("store operation failed, err: {e:?}");
    internal_error()
}
