//! HMAC request signatures.
//!
//! A signed request carries two headers:
//!
//! ```text
//! Date: Mon, 02 Jan 2006 15:04:05 GMT
//! Authorization: <access key>:<base64 HMAC-SHA256>
//! ```
//!
//! The MAC covers the canonical request: method, request URI (path and
//! query) and Date header, each followed by `\n`, then the raw SHA-256
//! digest of the body. [`RequestSigner`] produces the headers on the client
//! side and [`ApiRequestVerifier`] checks them on the server side.

use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, Method, Uri};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::body::ClonedBody;
use crate::error::{AuthenticationError, Error, InfrastructureError};
use crate::request::Identity;
use crate::store::{ApiKeySecret, ApiKeyStore};

type HmacSha256 = Hmac<Sha256>;

/// strftime pattern for RFC 1123 dates.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// SHA-256 of everything `body` yields.
pub fn body_digest(mut body: impl Read) -> io::Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    io::copy(&mut body, &mut hasher)?;
    Ok(hasher.finalize().into())
}

/// Bytes covered by the signature.
pub fn canonical_request(method: &Method, request_uri: &str, date: &str, body_digest: &[u8; 32]) -> Vec<u8> {
    let mut out = format!("{}\n{}\n{}\n", method.as_str(), request_uri, date).into_bytes();
    out.extend_from_slice(body_digest);
    out
}

/// Path plus query of `uri`, as signed.
pub fn request_uri(uri: &Uri) -> &str {
    uri.path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path())
}

/// Header values produced by [`RequestSigner::sign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// Value for the `Date` header
    pub date: String,
    /// Value for the `Authorization` header
    pub authorization: String,
}

/// Client-side signer for one API key.
///
/// ```
/// use axum::http::Method;
/// use policy_guard::RequestSigner;
///
/// let signer = RequestSigner::new("AK1", b"secret").unwrap();
/// let headers = signer.sign(&Method::POST, "/api/operations/1/evidence", b"{}", chrono::Utc::now());
/// assert!(headers.authorization.starts_with("AK1:"));
/// ```
#[derive(Clone)]
pub struct RequestSigner {
    access_key: String,
    mac: HmacSha256,
}

impl RequestSigner {
    /// Creates a signer for `access_key` with its secret.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLength` if the MAC rejects the key.
    pub fn new(access_key: impl Into<String>, secret_key: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            access_key: access_key.into(),
            mac: HmacSha256::new_from_slice(secret_key)?,
        })
    }

    /// Signs a request dated `at`.
    pub fn sign(&self, method: &Method, request_uri: &str, body: &[u8], at: DateTime<Utc>) -> SignedHeaders {
        let date = at.format(DATE_FORMAT).to_string();
        let digest: [u8; 32] = Sha256::digest(body).into();

        let mut mac = self.mac.clone();
        mac.update(&canonical_request(method, request_uri, &date, &digest));
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        SignedHeaders {
            date,
            authorization: format!("{}:{}", self.access_key, signature),
        }
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

/// Server-side verification of signed requests.
#[derive(Clone)]
pub struct ApiRequestVerifier {
    keys: Arc<dyn ApiKeyStore>,
    replay_window: Duration,
}

impl ApiRequestVerifier {
    /// Creates a verifier reading keys from `keys`.
    pub fn new(keys: Arc<dyn ApiKeyStore>, replay_window: Duration) -> Self {
        Self {
            keys,
            replay_window,
        }
    }

    /// Verifies a request against the current time.
    ///
    /// See [`verify_at`](Self::verify_at).
    pub async fn verify(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: impl Read,
    ) -> Result<Identity, Error> {
        self.verify_at(method, uri, headers, body, Utc::now()).await
    }

    /// Verifies a request whose body was duplicated by
    /// [`BodyCloner`](crate::BodyCloner), against the current time.
    ///
    /// Same checks as [`verify_at`](Self::verify_at); a spilled body is
    /// hashed off the async executor.
    pub async fn verify_cloned(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &ClonedBody,
    ) -> Result<Identity, Error> {
        let now = Utc::now();
        let claim = self.claim(headers, now).await?;
        let digest = body.digest().await.map_err(InfrastructureError::Io)?;
        self.settle(claim, method, uri, &digest, now).await
    }

    /// Verifies a request's signature and resolves the key's owner.
    ///
    /// On success the key's last-auth time is updated; a failed update is
    /// logged and ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::Authentication`] for a malformed, unknown, stale or
    ///   mismatching signature
    /// - [`Error::Infrastructure`] if the key lookup or body read fails
    pub async fn verify_at(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: impl Read,
        now: DateTime<Utc>,
    ) -> Result<Identity, Error> {
        let claim = self.claim(headers, now).await?;
        let digest = body_digest(body).map_err(InfrastructureError::Io)?;
        self.settle(claim, method, uri, &digest, now).await
    }

    /// Header checks and key lookup, everything that does not need the body.
    async fn claim<'h>(&self, headers: &'h HeaderMap, now: DateTime<Utc>) -> Result<Claim<'h>, Error> {
        let (access_key, provided) = parse_authorization(headers)?;
        let date = header_str(headers, header::DATE, "Date")?;
        self.check_replay_window(date, now)?;

        let key = self
            .keys
            .find_api_key(access_key)
            .await?
            .ok_or(AuthenticationError::UnknownAccessKey)?;

        Ok(Claim {
            access_key,
            date,
            provided,
            key,
        })
    }

    async fn settle(
        &self,
        claim: Claim<'_>,
        method: &Method,
        uri: &Uri,
        digest: &[u8; 32],
        now: DateTime<Utc>,
    ) -> Result<Identity, Error> {
        let Claim {
            access_key,
            date,
            provided,
            key,
        } = claim;

        let canonical = canonical_request(method, request_uri(uri), date, digest);
        if !signature_matches(key.secret_key.expose_secret(), &canonical, &provided) {
            return Err(AuthenticationError::SignatureMismatch.into());
        }

        if let Err(error) = self.keys.record_api_key_use(access_key, now).await {
            tracing::warn!(%error, access_key, "unable to record api key use");
        }
        tracing::debug!(user_id = key.owner_user_id, access_key, "api request verified");

        Ok(Identity {
            user_id: key.owner_user_id,
            is_admin: key.owner_is_admin,
        })
    }

    fn check_replay_window(&self, date: &str, now: DateTime<Utc>) -> Result<(), AuthenticationError> {
        let signed_at = DateTime::parse_from_rfc2822(date).map_err(|_| AuthenticationError::MalformedDate)?;
        let skew = now.signed_duration_since(signed_at).num_seconds();
        if skew.unsigned_abs() > self.replay_window.as_secs() {
            return Err(AuthenticationError::OutsideReplayWindow);
        }
        Ok(())
    }
}

/// A parsed signature whose key exists and whose date is fresh.
struct Claim<'h> {
    access_key: &'h str,
    date: &'h str,
    provided: Vec<u8>,
    key: ApiKeySecret,
}

impl fmt::Debug for ApiRequestVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequestVerifier")
            .field("replay_window", &self.replay_window)
            .finish_non_exhaustive()
    }
}

fn header_str<'a>(
    headers: &'a HeaderMap,
    name: header::HeaderName,
    label: &'static str,
) -> Result<&'a str, AuthenticationError> {
    let value = headers
        .get(name)
        .ok_or(AuthenticationError::MissingHeader(label))?;
    value.to_str().map_err(|_| match label {
        "Date" => AuthenticationError::MalformedDate,
        _ => AuthenticationError::MalformedAuthorization,
    })
}

fn parse_authorization(headers: &HeaderMap) -> Result<(&str, Vec<u8>), AuthenticationError> {
    let value = header_str(headers, header::AUTHORIZATION, "Authorization")?;
    let mut parts = value.split(':');
    let (Some(access_key), Some(encoded), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthenticationError::MalformedAuthorization);
    };
    if access_key.is_empty() {
        return Err(AuthenticationError::MalformedAuthorization);
    }
    let signature = STANDARD
        .decode(encoded)
        .map_err(|_| AuthenticationError::MalformedAuthorization)?;
    Ok((access_key, signature))
}

fn signature_matches(secret: &[u8], canonical: &[u8], provided: &[u8]) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(canonical);
    let expected = mac.finalize().into_bytes();
    expected.as_slice().ct_eq(provided).into()
}
