//! In-process stores backed by `parking_lot` locks.
//!
//! Useful for tests and for small deployments without a database. Failure
//! switches let callers exercise the fail-closed paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{ApiKeySecret, ApiKeyStore, RoleStore, Session, SessionStore, StoreError};
use crate::policy::{OperationRoleMap, Role};
use crate::request::{OperationId, UserId};
use crate::secret::Secret;

/// API key and operation-role tables held in memory.
///
/// ```
/// use policy_guard::{MemoryStore, Role};
///
/// let store = MemoryStore::new();
/// store.insert_api_key("AK1", b"secret".to_vec(), 7, false);
/// store.set_role(7, 1, Role::Write);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    api_keys: RwLock<HashMap<String, ApiKeySecret>>,
    roles: RwLock<HashMap<UserId, OperationRoleMap>>,
    fail_key_lookups: AtomicBool,
    fail_key_updates: AtomicBool,
    fail_role_queries: AtomicBool,
}

impl MemoryStore {
    /// Creates empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an API key, replacing any key with the same access key.
    pub fn insert_api_key(
        &self,
        access_key: impl Into<String>,
        secret_key: Vec<u8>,
        owner_user_id: UserId,
        owner_is_admin: bool,
    ) {
        let access_key = access_key.into();
        let row = ApiKeySecret {
            access_key: access_key.clone(),
            secret_key: Arc::new(Secret::new(secret_key)),
            owner_user_id,
            owner_is_admin,
            last_auth_at: None,
        };
        self.api_keys.write().insert(access_key, row);
    }

    /// Grants `role` on `operation_id` to `user_id`.
    pub fn set_role(&self, user_id: UserId, operation_id: OperationId, role: Role) {
        self.roles
            .write()
            .entry(user_id)
            .or_default()
            .insert(operation_id, role);
    }

    /// Removes any role `user_id` holds on `operation_id`.
    pub fn revoke_role(&self, user_id: UserId, operation_id: OperationId) {
        if let Some(map) = self.roles.write().get_mut(&user_id) {
            map.remove(&operation_id);
        }
    }

    /// Last successful authentication recorded for `access_key`.
    pub fn last_auth_at(&self, access_key: &str) -> Option<DateTime<Utc>> {
        self.api_keys
            .read()
            .get(access_key)
            .and_then(|row| row.last_auth_at)
    }

    /// Makes every API key lookup fail while set.
    pub fn fail_key_lookups(&self, fail: bool) {
        self.fail_key_lookups.store(fail, Ordering::SeqCst);
    }

    /// Makes every last-auth update fail while set.
    pub fn fail_key_updates(&self, fail: bool) {
        self.fail_key_updates.store(fail, Ordering::SeqCst);
    }

    /// Makes every role query fail while set.
    pub fn fail_role_queries(&self, fail: bool) {
        self.fail_role_queries.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn find_api_key(&self, access_key: &str) -> Result<Option<ApiKeySecret>, StoreError> {
        if self.fail_key_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::new("api_keys lookup unavailable"));
        }
        Ok(self.api_keys.read().get(access_key).cloned())
    }

    async fn record_api_key_use(&self, access_key: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if self.fail_key_updates.load(Ordering::SeqCst) {
            return Err(StoreError::new("api_keys update unavailable"));
        }
        match self.api_keys.write().get_mut(access_key) {
            Some(row) => {
                row.last_auth_at = Some(at);
                Ok(())
            }
            None => Err(StoreError::new(format!("no api key {access_key}"))),
        }
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn operation_roles_for_user(&self, user_id: UserId) -> Result<OperationRoleMap, StoreError> {
        if self.fail_role_queries.load(Ordering::SeqCst) {
            return Err(StoreError::new("user_operation_permissions unavailable"));
        }
        Ok(self.roles.read().get(&user_id).cloned().unwrap_or_default())
    }
}

/// Session table held in memory, keyed by token.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    /// Creates an empty session table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under `token`.
    pub fn insert(&self, token: impl Into<String>, session: Session) {
        self.sessions.write().insert(token.into(), session);
    }

    /// Drops the session under `token`.
    pub fn remove(&self, token: &str) {
        self.sessions.write().remove(token);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_session(&self, token: &str) -> Option<Session> {
        self.sessions.read().get(token).copied()
    }
}
