//! axum integration.
//!
//! Two middleware entry points establish who is calling and attach a
//! [`RequestContext`](crate::RequestContext) to the request:
//!
//! - [`authenticate_app_and_inject_context`] for HMAC-signed API requests.
//!   Rejects with 401 when the signature does not verify.
//! - [`authenticate_user_and_inject_context`] for browser sessions. Never
//!   rejects; a request without a session continues as anonymous.
//!
//! # Design Principles
//!
//! 1. **No Authorization at the Boundary**: neither entry point grants an
//!    action. Handlers call [`require_policy`](crate::require_policy) or
//!    [`RequestContext::require`](crate::RequestContext::require).
//!
//! 2. **Fail Closed**: a handler reached without middleware extracts an
//!    anonymous context whose policy is [`Policy::Deny`](crate::Policy::Deny).
//!
//! 3. **Explicit Context**: no global state. Stores and configuration live
//!    in [`AuthState`]; per-request data lives in the request extensions.

pub mod example_handler;
mod extract;
mod middleware;

pub use middleware::{
    authenticate_app_and_inject_context, authenticate_user_and_inject_context, build_context_for_user,
    AuthState,
};
