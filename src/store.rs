//! Persistence surfaces read (and, for `last_auth`, written) by the middleware.
//!
//! The middleware only sees these traits. Implementations must be safe to
//! call from many concurrent requests.
//!
//! - [`ApiKeyStore`]: API key lookup plus best-effort last-auth updates
//! - [`RoleStore`]: per-user operation roles
//! - [`SessionStore`]: sessions created by the login flow elsewhere

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::policy::OperationRoleMap;
use crate::request::UserId;
use crate::secret::Secret;

pub use memory::{MemorySessionStore, MemoryStore};

/// A failed store query.
#[derive(Debug, Error)]
#[error("store query failed: {message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    /// Creates an error with a description of what failed.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One row of the API key table, joined with its owner's admin flag.
#[derive(Debug, Clone)]
pub struct ApiKeySecret {
    /// Public half of the key pair, sent with each request
    pub access_key: String,
    /// HMAC key, shared by every copy of the row
    pub secret_key: Arc<Secret<Vec<u8>>>,
    /// User the key belongs to
    pub owner_user_id: UserId,
    /// Owner's global administrator flag
    pub owner_is_admin: bool,
    /// Time of the last successful authentication with this key
    pub last_auth_at: Option<DateTime<Utc>>,
}

/// A session established at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// Logged-in user; `0` or below means the session carries no user
    pub user_id: UserId,
    /// Admin flag captured at login
    pub is_admin: bool,
}

/// Lookup of API keys by access key.
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Returns the key stored under `access_key`, or `None` if there is none.
    async fn find_api_key(&self, access_key: &str) -> Result<Option<ApiKeySecret>, StoreError>;

    /// Records a successful authentication. Callers treat failure as non-fatal.
    async fn record_api_key_use(&self, access_key: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Lookup of the operation-role association table.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Loads every operation role held by `user_id`.
    async fn operation_roles_for_user(&self, user_id: UserId) -> Result<OperationRoleMap, StoreError>;
}

/// Lookup of existing sessions by token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the session for `token`, or `None` if it is unknown or expired.
    async fn load_session(&self, token: &str) -> Option<Session>;
}
