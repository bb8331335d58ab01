// SPDX-License-Identifier: MIT

//! Bearer-token authentication middleware.

use crate::error::AppError;
use crate::services::groups::ADMIN;
use crate::services::id_token::IdTokenError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Authenticated user extracted from a verified ID token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub sign_in_provider: Option<String>,
    /// Group claims carried by the token
    pub groups: Vec<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.groups.iter().any(|g| g == ADMIN)
    }
}

/// Middleware that requires a valid bearer ID token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(h) if h.starts_with("Bearer ") => h[7..].to_string(),
        _ => return Err(AppError::Unauthenticated),
    };

    let identity = state
        .id_token_verifier
        .verify(&token)
        .await
        .map_err(|err| match err {
            IdTokenError::Unauthorized(reason) => {
                tracing::debug!(reason = %reason, "Rejected bearer token");
                AppError::Unauthenticated
            }
            IdTokenError::Transient(reason) => {
                AppError::Internal(anyhow::anyhow!("ID-token verification failed: {reason}"))
            }
        })?;

    let auth_user = AuthUser {
        uid: identity.uid,
        email: identity.email,
        display_name: identity.display_name,
        photo_url: identity.photo_url,
        sign_in_provider: identity.sign_in_provider,
        groups: identity.groups,
    };
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Middleware that additionally requires the "admin" group claim.
///
/// Must run after [`require_auth`] on the same route stack.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AppError::Unauthenticated)?;

    if !user.is_admin() {
        tracing::warn!(uid = %user.uid, "Blocked non-admin access to admin route");
        return Err(AppError::PermissionDenied);
    }

    Ok(next.run(request).await)
}
