// SPDX-License-Identifier: MIT

//! Administrative routes (require the "admin" group claim).

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Application, UserProfile};
use crate::routes::api::SuccessResponse;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Admin routes. Auth and admin gating are applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route(
            "/api/admin/users/{uid}",
            axum::routing::delete(delete_user_account),
        )
        .route("/api/admin/users/{uid}/groups", put(update_user_groups))
}

// ─── User Listing ────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListUsersQuery {
    /// Restrict to users with an open team application
    applicants_only: bool,
}

/// User summary for the admin dashboard.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserSummary {
    pub uid: String,
    pub display_name: String,
    pub email: Option<String>,
    pub groups: Vec<String>,
    pub is_applying: bool,
    pub created_at: Option<String>,
    pub application: Option<Application>,
}

impl UserSummary {
    fn from_profile(profile: UserProfile) -> Self {
        let display_name = profile
            .display_name
            .or_else(|| profile.email.clone())
            .unwrap_or_else(|| profile.uid.clone());

        Self {
            uid: profile.uid,
            display_name,
            email: profile.email,
            groups: profile.groups,
            is_applying: profile.is_applying,
            created_at: profile.created_at,
            application: profile.application,
        }
    }
}

/// List user profiles, optionally applicants only.
async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserSummary>>> {
    let profiles = state.db.list_profiles(params.applicants_only).await?;

    tracing::debug!(
        count = profiles.len(),
        applicants_only = params.applicants_only,
        "Listing users"
    );

    Ok(Json(
        profiles.into_iter().map(UserSummary::from_profile).collect(),
    ))
}

// ─── Group Editing ───────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpdateGroupsRequest {
    groups: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UpdateGroupsResponse {
    pub success: bool,
    pub groups: Vec<String>,
}

/// Replace a user's group list.
async fn update_user_groups(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    Json(payload): Json<UpdateGroupsRequest>,
) -> Result<Json<UpdateGroupsResponse>> {
    if uid.trim().is_empty() {
        return Err(AppError::InvalidArgument(
            "A valid user ID is required.".to_string(),
        ));
    }

    let requested = payload.groups.ok_or_else(|| {
        AppError::InvalidArgument("Groups must be provided as an array.".to_string())
    })?;

    let groups = state.groups.update_groups(&uid, &requested).await?;

    Ok(Json(UpdateGroupsResponse {
        success: true,
        groups,
    }))
}

// ─── Account Deletion ────────────────────────────────────────

/// Delete a user's identity record and profile document.
async fn delete_user_account(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(uid): Path<String>,
) -> Result<Json<SuccessResponse>> {
    if uid.trim().is_empty() {
        return Err(AppError::InvalidArgument(
            "A valid user ID is required.".to_string(),
        ));
    }

    if uid == admin.uid {
        return Err(AppError::FailedPrecondition(
            "You cannot delete your own account.".to_string(),
        ));
    }

    tracing::info!(uid = %uid, admin = %admin.uid, "Admin-initiated account deletion");
    state.groups.delete_account(&uid).await?;

    Ok(Json(SuccessResponse { success: true }))
}
