// SPDX-License-Identifier: MIT

//! Identity-platform trigger hooks.
//!
//! These endpoints are called by the identity provider's blocking
//! pipeline, not directly by users. Requests carry a shared verify token
//! header; failures return 5xx so the provider retries (both handlers are
//! idempotent).

use crate::error::{AppError, Result};
use crate::routes::api::SuccessResponse;
use crate::services::groups::SignInContext;
use crate::AppState;
use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const HOOK_TOKEN_HEADER: &str = "x-identity-hook-token";

/// Hook routes (called by the identity platform).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/hooks/identity/created", post(account_created))
        .route("/hooks/identity/before-sign-in", post(before_sign_in))
}

fn verify_hook_token(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let presented = headers
        .get(HOOK_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok());

    if presented != Some(state.config.hook_verify_token.as_str()) {
        tracing::warn!("Blocked identity hook with invalid verify token");
        return Err(AppError::PermissionDenied);
    }

    Ok(())
}

// ─── Account Created ─────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AccountCreatedPayload {
    uid: String,
    email: Option<String>,
}

/// New-account trigger: seed the default group.
async fn account_created(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AccountCreatedPayload>,
) -> Result<Json<SuccessResponse>> {
    verify_hook_token(&state, &headers)?;

    if payload.uid.trim().is_empty() {
        return Err(AppError::InvalidArgument("A valid uid is required.".to_string()));
    }

    state
        .groups
        .on_account_created(&payload.uid, payload.email.as_deref())
        .await?;

    Ok(Json(SuccessResponse { success: true }))
}

// ─── Before Sign-In ──────────────────────────────────────────

/// Claims installed on the session token being issued.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeforeSignInResponse {
    pub custom_claims: SessionClaims,
}

#[derive(Serialize)]
pub struct SessionClaims {
    pub groups: Vec<String>,
}

/// Sign-in trigger: reconcile the profile and hand back session claims.
async fn before_sign_in(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(ctx): Json<SignInContext>,
) -> Result<Json<BeforeSignInResponse>> {
    verify_hook_token(&state, &headers)?;

    if ctx.uid.trim().is_empty() {
        return Err(AppError::InvalidArgument("A valid uid is required.".to_string()));
    }

    let groups = state.groups.on_before_sign_in(&ctx).await?;

    Ok(Json(BeforeSignInResponse {
        custom_claims: SessionClaims { groups },
    }))
}
