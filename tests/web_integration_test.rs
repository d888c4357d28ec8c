//! End-to-end tests through the axum middleware and example routes.
//!
//! Each test builds the example router over in-memory stores and drives it
//! with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::{middleware, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use policy_guard::web::example_handler::{example_router, list_evidence};
use policy_guard::web::{authenticate_app_and_inject_context, AuthState};
use policy_guard::{AuthConfig, MemorySessionStore, MemoryStore, RequestSigner, Role, Session};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tower::ServiceExt;

const MEMBER_KEY: &str = "AK-member";
const MEMBER_SECRET: &[u8] = b"member-secret";
const ADMIN_KEY: &str = "AK-admin";
const ADMIN_SECRET: &[u8] = b"admin-secret";

struct Harness {
    store: Arc<MemoryStore>,
    spill_dir: TempDir,
    state: AuthState,
    app: Router,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(|config| config)
    }

    fn with_config(configure: impl FnOnce(AuthConfig) -> AuthConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("policy_guard=debug")
            .with_test_writer()
            .try_init();

        let spill_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert_api_key(MEMBER_KEY, MEMBER_SECRET.to_vec(), 3, false);
        store.insert_api_key(ADMIN_KEY, ADMIN_SECRET.to_vec(), 1, true);
        store.set_role(3, 5, Role::Read);
        store.set_role(3, 6, Role::Write);

        let sessions = Arc::new(MemorySessionStore::new());
        sessions.insert("tok-member", Session { user_id: 3, is_admin: false });
        sessions.insert("tok-admin", Session { user_id: 1, is_admin: true });
        sessions.insert("tok-nobody", Session { user_id: 0, is_admin: true });

        let config = configure(AuthConfig::default().with_temp_dir(spill_dir.path()));
        let state = AuthState::new(store.clone(), store.clone(), sessions, config);

        Self {
            store,
            spill_dir,
            app: example_router(state.clone()),
            state,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    fn spilled_files(&self) -> usize {
        std::fs::read_dir(self.spill_dir.path()).unwrap().count()
    }
}

fn signed(method: Method, uri: &str, body: &[u8], access_key: &str, secret: &[u8]) -> Request<Body> {
    let headers = RequestSigner::new(access_key, secret)
        .unwrap()
        .sign(&method, uri, body, Utc::now());
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::DATE, headers.date)
        .header(header::AUTHORIZATION, headers.authorization)
        .body(Body::from(body.to_vec()))
        .unwrap()
}

fn with_session(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, format!("theme=dark; session={}", token))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- session routes ---

#[tokio::test]
async fn anonymous_request_passes_middleware_and_is_denied_by_handler() {
    let h = Harness::new();

    let response = h
        .send(Request::get("/web/operations/5/evidence").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, serde_json::json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn anonymous_handler_sees_fail_closed_defaults() {
    let h = Harness::new();

    let response = h
        .send(Request::get("/web/whoami").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user_id"], 0);
    assert_eq!(body["is_admin"], false);
    assert_eq!(body["policy"], "deny");
}

#[tokio::test]
async fn unknown_or_userless_session_is_anonymous() {
    let h = Harness::new();

    for token in ["tok-missing", "tok-nobody"] {
        let body = json_body(h.send(with_session("/web/whoami", token)).await).await;
        assert_eq!(body["user_id"], 0, "token {token}");
        assert_eq!(body["policy"], "deny", "token {token}");
    }
}

#[tokio::test]
async fn session_member_reads_only_its_operations() {
    let h = Harness::new();

    let allowed = h.send(with_session("/web/operations/5/evidence", "tok-member")).await;
    assert_eq!(allowed.status(), StatusCode::OK);
    assert_eq!(json_body(allowed).await["user_id"], 3);

    let denied = h.send(with_session("/web/operations/7/evidence", "tok-member")).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(denied).await, serde_json::json!({ "error": "Forbidden" }));
}

#[tokio::test]
async fn session_user_lists_only_own_api_keys() {
    let h = Harness::new();

    let own = h.send(with_session("/web/users/3/apikeys", "tok-member")).await;
    assert_eq!(own.status(), StatusCode::OK);

    let other = h.send(with_session("/web/users/4/apikeys", "tok-member")).await;
    assert_eq!(other.status(), StatusCode::FORBIDDEN);

    let admin = h.send(with_session("/web/users/4/apikeys", "tok-admin")).await;
    assert_eq!(admin.status(), StatusCode::OK);
}

#[tokio::test]
async fn global_admin_routes_require_admin_session() {
    let h = Harness::new();

    let member = h.send(with_session("/web/admin/users", "tok-member")).await;
    assert_eq!(member.status(), StatusCode::FORBIDDEN);

    let admin = h.send(with_session("/web/admin/users", "tok-admin")).await;
    assert_eq!(admin.status(), StatusCode::OK);
}

#[tokio::test]
async fn caller_request_id_reaches_handler() {
    let h = Harness::new();
    let mut request = with_session("/web/whoami", "tok-member");
    request
        .headers_mut()
        .insert("x-request-id", "req-trace-42".parse().unwrap());

    let body = json_body(h.send(request).await).await;
    assert_eq!(body["request_id"], "req-trace-42");
    assert_eq!(body["policy"], "union");
}

#[tokio::test]
async fn role_failure_denies_authenticated_session() {
    let h = Harness::new();
    h.store.fail_role_queries(true);

    let response = h.send(with_session("/web/operations/5/evidence", "tok-member")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = json_body(h.send(with_session("/web/whoami", "tok-member")).await).await;
    assert_eq!(body["user_id"], 3);
    assert_eq!(body["policy"], "deny");
}

#[tokio::test]
async fn handler_without_middleware_denies() {
    let app: Router = Router::new().route("/ops/:operation_id", get(list_evidence));

    let response = app
        .oneshot(Request::get("/ops/5").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// --- signed API routes ---

#[tokio::test]
async fn signed_request_with_role_succeeds() {
    let h = Harness::new();

    let response = h
        .send(signed(Method::GET, "/api/operations/5/evidence", b"", MEMBER_KEY, MEMBER_SECRET))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user_id"], 3);
    assert!(h.store.last_auth_at(MEMBER_KEY).is_some());
}

#[tokio::test]
async fn signed_request_with_query_string_succeeds() {
    let h = Harness::new();

    let response = h
        .send(signed(
            Method::GET,
            "/api/operations/5/evidence?page=2&sort=desc",
            b"",
            MEMBER_KEY,
            MEMBER_SECRET,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_signed_request_needs_no_operation_role() {
    let h = Harness::new();

    let response = h
        .send(signed(Method::DELETE, "/api/operations/99", b"", ADMIN_KEY, ADMIN_SECRET))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let member = h
        .send(signed(Method::DELETE, "/api/operations/6", b"", MEMBER_KEY, MEMBER_SECRET))
        .await;
    assert_eq!(member.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn verification_failures_share_one_generic_response() {
    let h = Harness::new();
    let uri = "/api/operations/5/evidence";

    let wrong_secret = signed(Method::GET, uri, b"", MEMBER_KEY, b"not-the-secret");
    let unknown_key = signed(Method::GET, uri, b"", "AK-ghost", MEMBER_SECRET);
    let unsigned = Request::get(uri).body(Body::empty()).unwrap();
    let mut stale = signed(Method::GET, uri, b"", MEMBER_KEY, MEMBER_SECRET);
    let old = RequestSigner::new(MEMBER_KEY, MEMBER_SECRET)
        .unwrap()
        .sign(&Method::GET, uri, b"", Utc::now() - Duration::hours(2));
    stale.headers_mut().insert(header::DATE, old.date.parse().unwrap());
    stale
        .headers_mut()
        .insert(header::AUTHORIZATION, old.authorization.parse().unwrap());

    for request in [wrong_secret, unknown_key, unsigned, stale] {
        let response = h.send(request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await, serde_json::json!({ "error": "Unauthorized" }));
    }
    assert!(h.store.last_auth_at(MEMBER_KEY).is_none());
}

#[tokio::test]
async fn body_attached_to_signed_get_is_covered_by_signature() {
    let h = Harness::new();
    let echo: Router = Router::new()
        .route("/api/echo", get(|body: Bytes| async move { body }))
        .layer(middleware::from_fn_with_state(
            h.state.clone(),
            authenticate_app_and_inject_context,
        ));

    let mut unsigned = signed(Method::GET, "/api/echo", b"", MEMBER_KEY, MEMBER_SECRET);
    *unsigned.body_mut() = Body::from("tampered-unsigned-body");
    let response = echo.clone().oneshot(unsigned).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let covered = signed(Method::GET, "/api/echo", b"signed-body", MEMBER_KEY, MEMBER_SECRET);
    let response = echo.oneshot(covered).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let seen = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&seen[..], b"signed-body");
}

#[tokio::test]
async fn tampered_body_is_rejected() {
    let h = Harness::new();
    let uri = "/api/operations/6/evidence";

    let headers = RequestSigner::new(MEMBER_KEY, MEMBER_SECRET)
        .unwrap()
        .sign(&Method::POST, uri, b"original", Utc::now());
    let request = Request::post(uri)
        .header(header::DATE, headers.date)
        .header(header::AUTHORIZATION, headers.authorization)
        .body(Body::from("tampered"))
        .unwrap();

    assert_eq!(h.send(request).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signed_upload_reaches_handler_intact() {
    let h = Harness::new();
    let payload = br#"{"kind":"screenshot","note":"login page"}"#;

    let response = h
        .send(signed(Method::POST, "/api/operations/6/evidence", payload, MEMBER_KEY, MEMBER_SECRET))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["bytes"], payload.len());
    assert_eq!(body["sha256"], STANDARD.encode(Sha256::digest(payload)));
}

#[tokio::test]
async fn spilled_upload_reaches_handler_intact_and_is_removed() {
    let h = Harness::with_config(|config| config.with_spill_threshold(64));
    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();

    let response = h
        .send(signed(Method::POST, "/api/operations/6/evidence", &payload, MEMBER_KEY, MEMBER_SECRET))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["bytes"], payload.len());
    assert_eq!(body["sha256"], STANDARD.encode(Sha256::digest(&payload)));
    assert_eq!(h.spilled_files(), 0);
}

#[tokio::test]
async fn spilled_body_is_removed_when_handler_denies() {
    let h = Harness::with_config(|config| config.with_spill_threshold(8));
    let payload = vec![b'x'; 4096];

    // Read role only: the upload handler denies after the body was spilled.
    let response = h
        .send(signed(Method::POST, "/api/operations/5/evidence", &payload, MEMBER_KEY, MEMBER_SECRET))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(h.spilled_files(), 0);
}

#[tokio::test]
async fn spilled_body_is_removed_when_verification_fails() {
    let h = Harness::with_config(|config| config.with_spill_threshold(8));
    let payload = vec![b'y'; 4096];

    let response = h
        .send(signed(Method::POST, "/api/operations/6/evidence", &payload, MEMBER_KEY, b"wrong"))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.spilled_files(), 0);
}

#[tokio::test]
async fn role_failure_denies_signed_request() {
    let h = Harness::new();
    h.store.fail_role_queries(true);

    let response = h
        .send(signed(Method::GET, "/api/operations/5/evidence", b"", MEMBER_KEY, MEMBER_SECRET))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn key_store_outage_is_internal_error() {
    let h = Harness::new();
    h.store.fail_key_lookups(true);

    let response = h
        .send(signed(Method::GET, "/api/operations/5/evidence", b"", MEMBER_KEY, MEMBER_SECRET))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "error": "An internal error occurred" })
    );
}

#[tokio::test]
async fn failed_last_auth_update_does_not_reject() {
    let h = Harness::new();
    h.store.fail_key_updates(true);

    let response = h
        .send(signed(Method::GET, "/api/operations/5/evidence", b"", MEMBER_KEY, MEMBER_SECRET))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.store.last_auth_at(MEMBER_KEY).is_none());
}
