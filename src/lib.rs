//! Request authentication and fail-closed authorization for axum services.
//!
//! Two ways to identify a caller:
//! - **Signed API requests**: `Authorization: <access key>:<signature>` plus a
//!   `Date` header, where the signature is an HMAC-SHA256 over method, URI,
//!   date and body digest. The body is duplicated so the handler still
//!   receives it after verification.
//! - **Sessions**: a token cookie resolved through a [`SessionStore`].
//!
//! Either way the caller ends up with a [`RequestContext`] holding its user
//! id, admin flag and a composed [`Policy`]. Handlers ask the policy before
//! doing anything sensitive; unset context denies everything.
//!
//! # Core Types
//!
//! - [`Policy`]: Deny, Authenticated, Operation or a Union of two policies
//! - [`Action`]: the closed set of actions a handler can require
//! - [`RequestContext`]: per-request identity plus policy
//! - [`ApiRequestVerifier`] / [`RequestSigner`]: the two sides of the HMAC scheme
//! - [`BodyCloner`]: single-pass body duplication with spill-to-disk
//! - [`PolicyBuilder`]: composes a caller's policy from the [`RoleStore`]
//! - [`web::AuthState`]: everything the axum middleware needs
//!
//! # Examples
//!
//! ```
//! use policy_guard::{Action, Policy, RequestContext, Role};
//!
//! let policy = Policy::union(
//!     Policy::Authenticated { user_id: 7, is_admin: false },
//!     Policy::Operation {
//!         user_id: 7,
//!         roles: [(42, Role::Write)].into_iter().collect(),
//!     },
//! );
//!
//! let ctx = RequestContext::new("req-123")
//!     .with_user_id(7)
//!     .with_admin(false)
//!     .with_policy(policy);
//!
//! assert!(ctx.require(&Action::ModifyEvidence { operation_id: 42 }).is_ok());
//! assert!(ctx.require(&Action::DeleteOperation { operation_id: 42 }).is_err());
//! assert!(ctx.require(&Action::ReadEvidence { operation_id: 43 }).is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod body;
mod builder;
mod config;
mod context;
mod error;
pub mod logging;
mod policy;
mod request;
mod secret;
mod session;
pub mod signature;
mod store;
pub mod web;

pub use body::{BodyCloner, BodyReader, ClonedBody};
pub use builder::PolicyBuilder;
pub use config::AuthConfig;
pub use context::{
    context_of, get_is_admin, get_policy, get_user_id, inject_context, require_policy, RequestContext,
};
pub use error::{AuthenticationError, Error, InfrastructureError, PermissionError};
pub use policy::{Action, Decision, OperationRoleMap, Policy, Role};
pub use request::{Identity, OperationId, UserId};
pub use secret::Secret;
pub use session::{parse_cookie, SessionResolver};
pub use signature::{ApiRequestVerifier, RequestSigner, SignedHeaders};
pub use store::{
    ApiKeySecret, ApiKeyStore, MemorySessionStore, MemoryStore, RoleStore, Session, SessionStore, StoreError,
};
