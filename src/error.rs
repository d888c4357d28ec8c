use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by authentication and authorization.
///
/// Every variant maps to a generic HTTP response. The `Display` output
/// carries the internal cause and is meant for logs only.
#[derive(Debug, Error)]
pub enum Error {
    /// Identity could not be established
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),
    /// Identity established, action denied by policy
    #[error("permission denied: {0}")]
    Permission(#[from] PermissionError),
    /// Storage or disk failure
    #[error("infrastructure failure: {0}")]
    Infrastructure(#[from] InfrastructureError),
}

impl Error {
    /// Status code used when this error reaches the HTTP boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Authentication(_) => StatusCode::UNAUTHORIZED,
            Error::Permission(e) if e.anonymous => StatusCode::UNAUTHORIZED,
            Error::Permission(_) => StatusCode::FORBIDDEN,
            Error::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the caller. Never depends on the internal cause.
    pub fn public_message(&self) -> &'static str {
        match self.status() {
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::FORBIDDEN => "Forbidden",
            _ => "An internal error occurred",
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Infrastructure(InfrastructureError::Store(e))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Authentication(cause) => tracing::info!(error = %cause, "rejecting request"),
            Error::Permission(cause) => tracing::debug!(error = %cause, "rejecting request"),
            Error::Infrastructure(cause) => tracing::error!(error = %cause, "request failed"),
        }
        let body = serde_json::json!({ "error": self.public_message() });
        (self.status(), Json(body)).into_response()
    }
}

/// Why a signed request could not be authenticated.
///
/// All variants collapse into the same 401 response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthenticationError {
    /// A required header is absent
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    /// The Authorization header is not `<access key>:<base64 signature>`
    #[error("malformed authorization header")]
    MalformedAuthorization,
    /// The Date header is not an RFC 1123 timestamp
    #[error("malformed date header")]
    MalformedDate,
    /// The Date header lies outside the accepted replay window
    #[error("request date outside replay window")]
    OutsideReplayWindow,
    /// No key is stored under the supplied access key
    #[error("unknown access key")]
    UnknownAccessKey,
    /// The recomputed signature differs from the supplied one
    #[error("signature mismatch")]
    SignatureMismatch,
}

/// An action denied by the caller's policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{action} denied: {reason}")]
pub struct PermissionError {
    /// Name of the denied action
    pub action: &'static str,
    /// Internal reason, never sent to the caller
    pub reason: String,
    /// Whether the caller had no identity at all
    pub anonymous: bool,
}

impl PermissionError {
    /// Creates a denial for an identified caller.
    pub fn new(action: &'static str, reason: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
            anonymous: false,
        }
    }

    pub(crate) fn for_anonymous(mut self, anonymous: bool) -> Self {
        self.anonymous = anonymous;
        self
    }
}

/// Storage, disk or transport failures.
#[derive(Debug, Error)]
pub enum InfrastructureError {
    /// Temp file allocation, write or read failed
    #[error("body storage i/o: {0}")]
    Io(#[from] std::io::Error),
    /// The inbound body stream failed
    #[error("reading request body: {0}")]
    Body(#[from] axum::Error),
    /// A store query failed
    #[error(transparent)]
    Store(#[from] StoreError),
}
