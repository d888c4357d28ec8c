//! Authentication middleware entry points.
//!
//! Both functions are meant for `axum::middleware::from_fn_with_state`:
//!
//! ```text
//! signed API request                    browser request
//!   ↓                                     ↓
//! BodyCloner                            SessionResolver
//!   ↓                                     ↓ (no session: pass through)
//! ApiRequestVerifier (401 on failure)   PolicyBuilder
//!   ↓                                     ↓
//! PolicyBuilder                         RequestContext in extensions
//!   ↓                                     ↓
//! RequestContext in extensions          handler → require_policy
//!   ↓
//! handler → require_policy
//!   ↓
//! ClonedBody released
//! ```
//!
//! Neither entry point grants anything by itself. Authorization happens in
//! each handler through [`RequestContext::require`] or
//! [`require_policy`](crate::require_policy).

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{Instrument, Span};

use crate::body::BodyCloner;
use crate::builder::PolicyBuilder;
use crate::config::AuthConfig;
use crate::context::{inject_context, RequestContext};
use crate::error::Error;
use crate::logging;
use crate::request::Identity;
use crate::session::SessionResolver;
use crate::signature::ApiRequestVerifier;
use crate::store::{ApiKeyStore, RoleStore, SessionStore};

/// Shared state for both middleware entry points.
///
/// Cheap to clone; every request sees the same stores.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use axum::{middleware, routing::get, Router};
/// use policy_guard::web::{authenticate_app_and_inject_context, AuthState};
/// use policy_guard::{AuthConfig, MemorySessionStore, MemoryStore};
///
/// let store = Arc::new(MemoryStore::new());
/// let state = AuthState::new(
///     store.clone(),
///     store,
///     Arc::new(MemorySessionStore::new()),
///     AuthConfig::default(),
/// );
///
/// let app: Router = Router::new()
///     .route("/api/ping", get(|| async { "pong" }))
///     .layer(middleware::from_fn_with_state(state, authenticate_app_and_inject_context));
/// ```
#[derive(Clone)]
pub struct AuthState {
    config: Arc<AuthConfig>,
    cloner: BodyCloner,
    verifier: ApiRequestVerifier,
    sessions: SessionResolver,
    policies: PolicyBuilder,
}

impl AuthState {
    /// Wires the stores and configuration together.
    pub fn new(
        api_keys: Arc<dyn ApiKeyStore>,
        roles: Arc<dyn RoleStore>,
        sessions: Arc<dyn SessionStore>,
        config: AuthConfig,
    ) -> Self {
        Self {
            cloner: BodyCloner::from_config(&config),
            verifier: ApiRequestVerifier::new(api_keys, config.replay_window()),
            sessions: SessionResolver::new(sessions, config.session_cookie.clone()),
            policies: PolicyBuilder::new(roles),
            config: Arc::new(config),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builds the context a request made by `identity` would receive.
///
/// Used by both entry points; public for other entry points that resolve
/// identity on their own.
pub async fn build_context_for_user(
    state: &AuthState,
    request_id: impl Into<String>,
    identity: Identity,
) -> RequestContext {
    state.policies.build_context(request_id, identity).await
}

/// Authenticates a signed API request and injects its context.
///
/// The body is duplicated so the signature can cover it while the handler
/// still receives it intact. Any verification failure short-circuits with
/// 401 and `{"error": "Unauthorized"}`; storage and disk failures with 500.
/// The duplicated body is released once the handler's response is ready,
/// or when the request future is dropped.
pub async fn authenticate_app_and_inject_context(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = logging::request_id(request.headers());
    let span = logging::request_span("api", &request_id, request.method(), request.uri());
    authenticate_app(state, request_id, request, next)
        .instrument(span)
        .await
}

async fn authenticate_app(state: AuthState, request_id: String, request: Request, next: Next) -> Response {
    let (mut request, body) = match state.cloner.clone_request(request).await {
        Ok(cloned) => cloned,
        Err(error) => return Error::from(error).into_response(),
    };
    let identity = match state
        .verifier
        .verify_cloned(request.method(), request.uri(), request.headers(), &body)
        .await
    {
        Ok(identity) => identity,
        Err(error) => return error.into_response(),
    };
    Span::current().record("user_id", identity.user_id);

    let ctx = build_context_for_user(&state, request_id, identity).await;
    inject_context(request.extensions_mut(), ctx);

    let response = next.run(request).await;
    body.cleanup();
    response
}

/// Resolves the caller's session, if any, and injects its context.
///
/// Never rejects. Without a valid session the request continues unchanged
/// and handlers see the anonymous defaults (user 0, not admin, deny-all
/// policy); enforcement is left to each handler's policy check.
pub async fn authenticate_user_and_inject_context(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = logging::request_id(request.headers());
    let span = logging::request_span("session", &request_id, request.method(), request.uri());

    async move {
        match state.sessions.resolve(request.headers()).await {
            Some(identity) => {
                Span::current().record("user_id", identity.user_id);
                let ctx = build_context_for_user(&state, request_id, identity).await;
                inject_context(request.extensions_mut(), ctx);
            }
            None => tracing::trace!("no session, continuing anonymously"),
        }
        next.run(request).await
    }
    .instrument(span)
    .await
}
