//! Extractor for the request context.

use std::convert::Infallible;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::context::{context_of, RequestContext};
use crate::logging;

/// Hands the injected [`RequestContext`] to a handler.
///
/// Never rejects. A request that skipped the authentication middleware
/// gets an anonymous context whose policy denies everything.
#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(match context_of(&parts.extensions) {
            Some(ctx) => ctx.clone(),
            None => RequestContext::new(logging::request_id(&parts.headers)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;
    use crate::request::Identity;
    use axum::http::Request;

    #[tokio::test]
    async fn missing_context_extracts_as_anonymous() {
        let (mut parts, _) = Request::builder()
            .header(logging::REQUEST_ID_HEADER, "req-77")
            .body(())
            .unwrap()
            .into_parts();

        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.request_id(), "req-77");
        assert_eq!(ctx.user_id(), 0);
        assert_eq!(ctx.policy(), &Policy::Deny);
    }

    #[tokio::test]
    async fn injected_context_is_returned() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        parts.extensions.insert(RequestContext::for_identity(
            "req-1",
            Identity::user(12),
            Policy::Authenticated {
                user_id: 12,
                is_admin: false,
            },
        ));

        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.user_id(), 12);
        assert_eq!(ctx.request_id(), "req-1");
    }
}
