//! Resolution of an existing login session into an identity.
//!
//! Creating sessions belongs to the login flow. This module only reads the
//! token cookie and asks the [`SessionStore`] what it refers to.

use std::sync::Arc;

use axum::http::{header, HeaderMap};

use crate::request::Identity;
use crate::store::SessionStore;

/// Looks up the caller's session from the request cookie.
#[derive(Clone)]
pub struct SessionResolver {
    sessions: Arc<dyn SessionStore>,
    cookie_name: String,
}

impl SessionResolver {
    /// Creates a resolver reading the token from cookie `cookie_name`.
    pub fn new(sessions: Arc<dyn SessionStore>, cookie_name: impl Into<String>) -> Self {
        Self {
            sessions,
            cookie_name: cookie_name.into(),
        }
    }

    /// Returns the session's identity, or `None` for anonymous callers.
    ///
    /// A missing cookie, an unknown token and a session without a user all
    /// resolve to `None`. None of them is an error.
    pub async fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let token = parse_cookie(headers, &self.cookie_name)?;
        let session = self.sessions.load_session(&token).await?;
        if session.user_id <= 0 {
            return None;
        }
        Some(Identity {
            user_id: session.user_id,
            is_admin: session.is_admin,
        })
    }
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

/// Value of cookie `name`, searching every `Cookie` header.
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name && !value.is_empty()).then(|| value.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemorySessionStore, Session};
    use axum::http::HeaderValue;

    fn headers(cookies: &[&'static str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for c in cookies {
            map.append(header::COOKIE, HeaderValue::from_static(c));
        }
        map
    }

    fn resolver() -> SessionResolver {
        let store = Arc::new(MemorySessionStore::new());
        store.insert(
            "tok-user",
            Session {
                user_id: 5,
                is_admin: false,
            },
        );
        store.insert(
            "tok-admin",
            Session {
                user_id: 1,
                is_admin: true,
            },
        );
        store.insert(
            "tok-empty",
            Session {
                user_id: 0,
                is_admin: true,
            },
        );
        store.insert(
            "tok-negative",
            Session {
                user_id: -4,
                is_admin: false,
            },
        );
        SessionResolver::new(store, "session")
    }

    #[test]
    fn cookie_parsing() {
        let h = headers(&["theme=dark; session=abc", "other=1"]);
        assert_eq!(parse_cookie(&h, "session").as_deref(), Some("abc"));
        assert_eq!(parse_cookie(&h, "other").as_deref(), Some("1"));
        assert_eq!(parse_cookie(&h, "missing"), None);
        assert_eq!(parse_cookie(&headers(&["session="]), "session"), None);
        assert_eq!(parse_cookie(&headers(&["xsession=abc"]), "session"), None);
    }

    #[tokio::test]
    async fn resolves_known_sessions() {
        let r = resolver();
        assert_eq!(
            r.resolve(&headers(&["session=tok-user"])).await,
            Some(Identity::user(5))
        );
        assert_eq!(
            r.resolve(&headers(&["session=tok-admin"])).await,
            Some(Identity::admin(1))
        );
    }

    #[tokio::test]
    async fn anonymous_cases() {
        let r = resolver();
        assert_eq!(r.resolve(&HeaderMap::new()).await, None);
        assert_eq!(r.resolve(&headers(&["session=forged"])).await, None);
        assert_eq!(r.resolve(&headers(&["session=tok-empty"])).await, None);
        assert_eq!(r.resolve(&headers(&["session=tok-negative"])).await, None);
    }
}
