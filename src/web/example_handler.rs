//! Example routes wired through both authentication entry points.
//!
//! Signed API routes live under `/api`, session routes under `/web`. Every
//! handler checks its own action against the injected policy; the
//! middleware only establishes who is calling.
//!
//! **These routes exist for documentation and tests.** They hold no data.

use axum::body::Bytes;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{middleware, Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::{authenticate_app_and_inject_context, authenticate_user_and_inject_context, AuthState};
use crate::context::RequestContext;
use crate::error::Error;
use crate::policy::Action;
use crate::request::{OperationId, UserId};

/// Signed API routes behind [`authenticate_app_and_inject_context`].
pub fn api_router(state: AuthState) -> Router {
    Router::new()
        .route(
            "/api/operations/:operation_id/evidence",
            get(list_evidence).post(upload_evidence),
        )
        .route("/api/operations/:operation_id", axum::routing::delete(delete_operation))
        .layer(middleware::from_fn_with_state(state, authenticate_app_and_inject_context))
}

/// Session routes behind [`authenticate_user_and_inject_context`].
pub fn web_router(state: AuthState) -> Router {
    Router::new()
        .route("/web/whoami", get(whoami))
        .route("/web/operations/:operation_id/evidence", get(list_evidence))
        .route("/web/users/:user_id/apikeys", get(list_api_keys))
        .route("/web/admin/users", get(list_users))
        .layer(middleware::from_fn_with_state(state, authenticate_user_and_inject_context))
}

/// Both routers merged.
pub fn example_router(state: AuthState) -> Router {
    api_router(state.clone()).merge(web_router(state))
}

/// Reports the caller as seen by the handler. Requires nothing.
pub async fn whoami(ctx: RequestContext) -> Json<Value> {
    Json(json!({
        "request_id": ctx.request_id(),
        "user_id": ctx.user_id(),
        "is_admin": ctx.is_admin(),
        "policy": ctx.policy().kind(),
    }))
}

/// Lists evidence of an operation.
pub async fn list_evidence(
    ctx: RequestContext,
    Path(operation_id): Path<OperationId>,
) -> Result<Json<Value>, Error> {
    ctx.require(&Action::ReadEvidence { operation_id })?;
    Ok(Json(json!({
        "operation_id": operation_id,
        "user_id": ctx.user_id(),
        "evidence": [],
    })))
}

/// Accepts an evidence upload and echoes its size and digest.
pub async fn upload_evidence(
    ctx: RequestContext,
    Path(operation_id): Path<OperationId>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), Error> {
    ctx.require(&Action::ModifyEvidence { operation_id })?;
    tracing::info!(operation_id, bytes = body.len(), "evidence uploaded");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "operation_id": operation_id,
            "bytes": body.len(),
            "sha256": STANDARD.encode(Sha256::digest(&body)),
        })),
    ))
}

/// Deletes an operation.
pub async fn delete_operation(
    ctx: RequestContext,
    Path(operation_id): Path<OperationId>,
) -> Result<StatusCode, Error> {
    ctx.require(&Action::DeleteOperation { operation_id })?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lists a user's API keys.
pub async fn list_api_keys(ctx: RequestContext, Path(user_id): Path<UserId>) -> Result<Json<Value>, Error> {
    ctx.require(&Action::ListApiKeys { user_id })?;
    Ok(Json(json!({ "user_id": user_id, "apikeys": [] })))
}

/// Lists every user. Global admins only.
pub async fn list_users(ctx: RequestContext) -> Result<Json<Value>, Error> {
    ctx.require(&Action::GlobalAdmin)?;
    Ok(Json(json!({ "users": [] })))
}
