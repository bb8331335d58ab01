// SPDX-License-Identifier: MIT

//! Group membership synchronization between token claims and profiles.
//!
//! Three triggers keep the identity provider's custom claims and the
//! Firestore profile document in agreement:
//! - account creation seeds the "member" role in both stores
//! - every sign-in reconciles the profile and returns the session claims
//! - admin edits replace the group list in both stores together
//!
//! The donor grant is a shared primitive for the payment flow: it only
//! ever adds roles.
//!
//! Claims and document writes are not transactional across the two
//! stores; each trigger fails the whole call on any sub-write error
//! instead of reporting partial success.

use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::Transaction;
use crate::services::identity::IdentityService;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;

/// Roles the administrative path may write.
pub const ALLOWED_GROUPS: [&str; 5] = ["member", "subscriber", "donor", "admin", "developer"];

/// Role every account holds.
pub const MEMBER: &str = "member";
/// Role granted on a confirmed donation.
pub const DONOR: &str = "donor";
/// Role required for administrative operations.
pub const ADMIN: &str = "admin";

/// Sign-in provider id that gets its display name mirrored separately.
const GITHUB_PROVIDER: &str = "github.com";

/// Claims key carrying the group list.
const GROUPS_CLAIM: &str = "groups";

/// Sign-in context forwarded by the identity platform's blocking trigger.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignInContext {
    pub uid: String,
    pub email: Option<String>,
    /// Display name stored on the account record
    pub display_name: Option<String>,
    /// Avatar stored on the account record
    pub photo_url: Option<String>,
    /// Name asserted by the provider inside the incoming token
    pub provider_name: Option<String>,
    /// Avatar asserted by the provider inside the incoming token
    pub provider_photo: Option<String>,
    /// e.g. "password" or "github.com"
    pub sign_in_provider: Option<String>,
}

/// Group synchronization service.
#[derive(Clone)]
pub struct GroupService {
    db: FirestoreDb,
    identity: IdentityService,
}

impl GroupService {
    pub fn new(db: FirestoreDb, identity: IdentityService) -> Self {
        Self { db, identity }
    }

    /// Account-created trigger: seed "member" on claims and profile.
    ///
    /// Safe to re-run on provider retry; the profile is merge-created and
    /// the claims write is a plain overwrite of the same value.
    pub async fn on_account_created(
        &self,
        uid: &str,
        email: Option<&str>,
    ) -> Result<(), AppError> {
        let mut claims = serde_json::Map::new();
        claims.insert(GROUPS_CLAIM.to_string(), json!([MEMBER]));
        self.identity.set_custom_claims(uid, &claims).await?;

        let mut profile = self.db.get_profile(uid).await?.unwrap_or_default();
        profile.uid = uid.to_string();
        profile.groups = vec![MEMBER.to_string()];
        if let Some(email) = email {
            profile.email = Some(email.to_string());
        }
        if profile.created_at.is_none() {
            profile.created_at = Some(chrono::Utc::now().to_rfc3339());
        }
        self.db.upsert_profile(&profile).await?;

        tracing::info!(uid, "Default group 'member' assigned");
        Ok(())
    }

    /// Pre-sign-in trigger: reconcile the profile and return the group
    /// list to install as the session token's custom claims.
    pub async fn on_before_sign_in(&self, ctx: &SignInContext) -> Result<Vec<String>, AppError> {
        let mut profile = self.db.get_profile(&ctx.uid).await?.unwrap_or_default();

        let groups = normalize_sign_in_groups(std::mem::take(&mut profile.groups));

        // The identity record is the third link in the display-name chain.
        let record = self.identity.get_user(&ctx.uid).await?;

        let resolved_display_name = ctx
            .provider_name
            .clone()
            .or_else(|| ctx.display_name.clone())
            .or_else(|| record.display_name.clone())
            .or_else(|| profile.display_name.clone())
            .or_else(|| ctx.email.clone())
            .unwrap_or_else(|| ctx.uid.clone());

        let resolved_photo = ctx
            .provider_photo
            .clone()
            .or_else(|| ctx.photo_url.clone())
            .or_else(|| record.photo_url.clone())
            .or_else(|| profile.photo_url.clone());

        // A GitHub sign-in refreshes the GitHub-specific name; any other
        // provider leaves a previously recorded one untouched.
        if ctx.sign_in_provider.as_deref() == Some(GITHUB_PROVIDER) {
            profile.github_display_name = Some(
                ctx.provider_name
                    .clone()
                    .unwrap_or_else(|| resolved_display_name.clone()),
            );
        }

        profile.uid = ctx.uid.clone();
        profile.display_name = Some(resolved_display_name);
        profile.photo_url = resolved_photo;
        profile.groups = groups.clone();
        profile.last_login = Some(chrono::Utc::now().to_rfc3339());
        self.db.upsert_profile(&profile).await?;

        tracing::info!(uid = %ctx.uid, groups = ?groups, "Applying custom claims for session");
        Ok(groups)
    }

    /// Administrative group edit: sanitize the requested list and write it
    /// to claims (merged over other claims keys) and profile together.
    pub async fn update_groups(
        &self,
        uid: &str,
        requested: &[String],
    ) -> Result<Vec<String>, AppError> {
        let sanitized = sanitize_admin_groups(requested);

        let record = self.identity.get_user(uid).await?;
        let mut claims = record.custom_claims;
        claims.insert(GROUPS_CLAIM.to_string(), json!(sanitized));

        let mut profile = self.db.get_profile(uid).await?.unwrap_or_default();
        profile.uid = uid.to_string();
        profile.groups = sanitized.clone();
        profile.is_applying = false;
        profile.updated_at = Some(chrono::Utc::now().to_rfc3339());

        // Either write failing fails the whole edit; no partial-success
        // reporting.
        futures_util::future::try_join(
            self.identity.set_custom_claims(uid, &claims),
            self.db.upsert_profile(&profile),
        )
        .await?;

        tracing::info!(uid, groups = ?sanitized, "Updated user groups");
        Ok(sanitized)
    }

    /// Donor grant: union {member, donor} into profile and claims without
    /// removing existing roles, and append the transaction to the bounded
    /// history.
    pub async fn grant_donor(&self, uid: &str, txn: Transaction) -> Result<(), AppError> {
        let mut profile = self.db.get_profile(uid).await?.unwrap_or_default();
        profile.uid = uid.to_string();
        profile.groups = union_roles(&profile.groups, &[MEMBER, DONOR]);
        profile.transactions.push(txn);
        profile.updated_at = Some(chrono::Utc::now().to_rfc3339());
        self.db.upsert_profile(&profile).await?;

        let record = self.identity.get_user(uid).await?;
        let mut claims = record.custom_claims;
        let claim_groups = claim_group_list(&claims);
        claims.insert(
            GROUPS_CLAIM.to_string(),
            json!(union_roles(&claim_groups, &[MEMBER, DONOR])),
        );
        self.identity.set_custom_claims(uid, &claims).await?;

        tracing::info!(uid, "Donor role granted");
        Ok(())
    }

    /// Delete the identity record and, best-effort, the profile document.
    pub async fn delete_account(&self, uid: &str) -> Result<(), AppError> {
        self.identity.delete_user(uid).await?;

        if let Err(e) = self.db.delete_profile(uid).await {
            tracing::warn!(uid, error = %e, "Failed to delete profile document");
        }

        tracing::info!(uid, "Deleted user");
        Ok(())
    }
}

/// Extract the group list from a claims map, tolerating junk shapes.
fn claim_group_list(claims: &serde_json::Map<String, serde_json::Value>) -> Vec<String> {
    claims
        .get(GROUPS_CLAIM)
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Sign-in normalization: an empty list becomes `["member"]`, duplicates
/// collapse keeping first-seen order, and "member" is prepended if absent.
pub fn normalize_sign_in_groups(existing: Vec<String>) -> Vec<String> {
    let groups = if existing.is_empty() {
        vec![MEMBER.to_string()]
    } else {
        existing
    };

    let mut groups = dedupe_preserving_order(groups);
    if !groups.iter().any(|g| g == MEMBER) {
        groups.insert(0, MEMBER.to_string());
    }
    groups
}

/// Admin-supplied lists are trimmed, restricted to the known roles,
/// deduplicated, forced to contain "member", and sorted.
pub fn sanitize_admin_groups(requested: &[String]) -> Vec<String> {
    let mut groups: Vec<String> = requested
        .iter()
        .map(|g| g.trim().to_string())
        .filter(|g| ALLOWED_GROUPS.contains(&g.as_str()))
        .collect();
    groups.push(MEMBER.to_string());
    groups.sort();
    groups.dedup();
    groups
}

/// Order-preserving set union; never removes roles, never sorts.
pub fn union_roles(existing: &[String], added: &[&str]) -> Vec<String> {
    let mut out = dedupe_preserving_order(existing.to_vec());
    for role in added {
        if !out.iter().any(|g| g == role) {
            out.push(role.to_string());
        }
    }
    out
}

fn dedupe_preserving_order(groups: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    groups.into_iter().filter(|g| seen.insert(g.clone())).collect()
}
