use std::sync::Arc;

use axum::http::Extensions;

use crate::error::Error;
use crate::policy::{Action, Policy};
use crate::request::{Identity, UserId};

static DENY: Policy = Policy::Deny;

/// Identity and policy attached to one in-flight request.
///
/// The context has three independent slots (user id, admin flag, policy).
/// Each getter returns a fail-closed default when its slot is unset, so a
/// handler reached without passing the authentication middleware sees an
/// anonymous caller whose every check is denied.
///
/// The middleware stores one `RequestContext` in the request extensions.
/// Handlers take it as an extractor or read it through the free functions
/// [`get_user_id`], [`get_is_admin`], [`get_policy`] and [`require_policy`].
///
/// # Examples
///
/// ```
/// use policy_guard::{Action, Policy, RequestContext};
///
/// let anon = RequestContext::new("req-1");
/// assert_eq!(anon.user_id(), 0);
/// assert!(!anon.is_admin());
/// assert_eq!(anon.policy(), &Policy::Deny);
/// assert!(anon.require(&Action::LoggedIn).is_err());
///
/// let ctx = RequestContext::new("req-2")
///     .with_user_id(7)
///     .with_policy(Policy::Authenticated { user_id: 7, is_admin: false });
/// assert!(ctx.require(&Action::LoggedIn).is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    user_id: Option<UserId>,
    is_admin: Option<bool>,
    policy: Option<Arc<Policy>>,
}

impl RequestContext {
    /// Creates a context with every slot unset.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: None,
            is_admin: None,
            policy: None,
        }
    }

    /// Creates a context for a resolved identity and its policy.
    pub fn for_identity(request_id: impl Into<String>, identity: Identity, policy: Policy) -> Self {
        Self::new(request_id)
            .with_user_id(identity.user_id)
            .with_admin(identity.is_admin)
            .with_policy(policy)
    }

    /// Fills the user id slot.
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Fills the admin slot.
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = Some(is_admin);
        self
    }

    /// Fills the policy slot.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Request identifier used in logs.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Caller's user id, `0` when unset.
    pub fn user_id(&self) -> UserId {
        self.user_id.unwrap_or(0)
    }

    /// Caller's global admin flag, `false` when unset.
    pub fn is_admin(&self) -> bool {
        self.is_admin.unwrap_or(false)
    }

    /// Caller's policy, [`Policy::Deny`] when unset.
    pub fn policy(&self) -> &Policy {
        self.policy.as_deref().unwrap_or(&DENY)
    }

    /// Whether no user is attached.
    pub fn is_anonymous(&self) -> bool {
        self.user_id() == 0
    }

    /// Checks `action` against the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Permission`]; its HTTP status is 401 for anonymous
    /// callers and 403 otherwise.
    pub fn require(&self, action: &Action) -> Result<(), Error> {
        self.policy().check(action).map_err(|denied| {
            tracing::debug!(
                request_id = %self.request_id,
                user_id = self.user_id(),
                action = %action,
                reason = %denied.reason,
                "policy denied action"
            );
            Error::Permission(denied.for_anonymous(self.is_anonymous()))
        })
    }
}

/// Stores `ctx` in the request extensions, replacing any previous context.
pub fn inject_context(extensions: &mut Extensions, ctx: RequestContext) {
    extensions.insert(ctx);
}

/// The context stored in `extensions`, if any.
pub fn context_of(extensions: &Extensions) -> Option<&RequestContext> {
    extensions.get::<RequestContext>()
}

/// Caller's user id, `0` without a context.
pub fn get_user_id(extensions: &Extensions) -> UserId {
    context_of(extensions).map_or(0, RequestContext::user_id)
}

/// Caller's admin flag, `false` without a context.
pub fn get_is_admin(extensions: &Extensions) -> bool {
    context_of(extensions).is_some_and(RequestContext::is_admin)
}

/// Caller's policy, [`Policy::Deny`] without a context.
pub fn get_policy(extensions: &Extensions) -> &Policy {
    context_of(extensions).map_or(&DENY, RequestContext::policy)
}

/// Checks `action` against the caller's policy. Every sensitive handler
/// calls this before touching protected data.
///
/// # Errors
///
/// Returns [`Error::Permission`] if the policy denies the action, including
/// when no context was injected.
pub fn require_policy(extensions: &Extensions, action: &Action) -> Result<(), Error> {
    match context_of(extensions) {
        Some(ctx) => ctx.require(action),
        None => RequestContext::new("").require(action),
    }
}
