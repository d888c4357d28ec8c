//! Request correlation for logs.
//!
//! Every middleware invocation runs inside an `authenticate` span carrying
//! the request id, so events emitted by stores, the verifier and handlers
//! are correlated without threading the id by hand.

use axum::http::{HeaderMap, Method, Uri};
use tracing::Span;
use uuid::Uuid;

/// Header consulted for a caller-supplied request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Request id from [`REQUEST_ID_HEADER`], or a fresh UUID v4.
///
/// Header values that are empty, overlong or contain anything other than
/// ASCII alphanumerics, `-`, `_` and `.` are ignored so that the id is safe
/// to log verbatim.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|id| is_loggable(id))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn is_loggable(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Span wrapping one authentication pass and the handler behind it.
pub fn request_span(scheme: &'static str, request_id: &str, method: &Method, uri: &Uri) -> Span {
    tracing::info_span!(
        "authenticate",
        scheme,
        request_id = %request_id,
        method = %method,
        path = %uri.path(),
        user_id = tracing::field::Empty,
    )
}
