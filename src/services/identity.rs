// SPDX-License-Identifier: MIT

//! Identity-provider admin client.
//!
//! Talks to the Identity Platform accounts API over REST:
//! - account lookups (display name, photo, custom claims)
//! - custom-claims writes (group membership carried by issued tokens)
//! - account deletion
//!
//! When FIREBASE_AUTH_EMULATOR_HOST is set, requests target the Auth
//! emulator with its well-known owner token. Otherwise access tokens come
//! from the metadata server and are cached until shortly before expiry.

use crate::error::AppError;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const PROD_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(60);

#[derive(Clone, Copy)]
enum AuthMode {
    /// Access tokens fetched from the GCE/Cloud Run metadata server.
    Metadata,
    /// The Auth emulator accepts the literal "owner" token.
    Emulator,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Identity admin API client.
#[derive(Clone)]
pub struct IdentityService {
    inner: Option<Arc<IdentityInner>>,
}

struct IdentityInner {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    auth: AuthMode,
    token_cache: RwLock<Option<CachedToken>>,
}

/// Identity record fields consumed by group synchronization.
#[derive(Debug, Clone, Default)]
pub struct IdentityUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    /// Custom-claims payload attached to issued tokens. Group rewrites
    /// must merge over the other keys, never replace the whole map.
    pub custom_claims: serde_json::Map<String, serde_json::Value>,
}

impl IdentityService {
    /// Create a new identity admin client.
    pub fn new(project_id: &str) -> Self {
        let (base_url, auth) = match std::env::var("FIREBASE_AUTH_EMULATOR_HOST") {
            Ok(host) => (
                format!("http://{host}/identitytoolkit.googleapis.com/v1"),
                AuthMode::Emulator,
            ),
            Err(_) => (PROD_BASE_URL.to_string(), AuthMode::Metadata),
        };

        Self {
            inner: Some(Arc::new(IdentityInner {
                http: reqwest::Client::new(),
                base_url,
                project_id: project_id.to_string(),
                auth,
                token_cache: RwLock::new(None),
            })),
        }
    }

    /// Create a mock identity client for testing (offline mode).
    ///
    /// All identity operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { inner: None }
    }

    fn get_inner(&self) -> Result<&IdentityInner, AppError> {
        self.inner
            .as_deref()
            .ok_or_else(|| AppError::IdentityApi("Identity API not connected (offline mode)".to_string()))
    }

    /// Look up an identity record by uid.
    pub async fn get_user(&self, uid: &str) -> Result<IdentityUser, AppError> {
        let inner = self.get_inner()?;

        let body = serde_json::json!({ "localId": [uid] });
        let response: LookupResponse = inner
            .post_json("accounts:lookup", &body)
            .await?;

        let account = response
            .users
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", uid)))?;

        let custom_claims = account
            .custom_attributes
            .as_deref()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();

        Ok(IdentityUser {
            uid: account.local_id,
            email: account.email,
            display_name: account.display_name,
            photo_url: account.photo_url,
            custom_claims,
        })
    }

    /// Replace the custom-claims payload attached to a user's tokens.
    ///
    /// Claims take effect on the next token the provider issues; clients
    /// see them after forcing a token refresh.
    pub async fn set_custom_claims(
        &self,
        uid: &str,
        claims: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), AppError> {
        let inner = self.get_inner()?;

        let attributes = serde_json::to_string(claims)
            .map_err(|e| AppError::IdentityApi(format!("Unserializable claims: {}", e)))?;

        let body = serde_json::json!({
            "localId": uid,
            "customAttributes": attributes,
        });

        let _: serde_json::Value = inner.post_json("accounts:update", &body).await?;
        Ok(())
    }

    /// Delete an identity record.
    pub async fn delete_user(&self, uid: &str) -> Result<(), AppError> {
        let inner = self.get_inner()?;

        let body = serde_json::json!({ "localId": uid });
        let _: serde_json::Value = inner.post_json("accounts:delete", &body).await?;
        Ok(())
    }
}

impl IdentityInner {
    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, AppError> {
        let url = format!(
            "{}/projects/{}/{}",
            self.base_url, self.project_id, method
        );
        let token = self.access_token().await?;

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::IdentityApi(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::IdentityApi(format!(
                "{} returned {}: {}",
                method, status, text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::IdentityApi(format!("Invalid {} response: {}", method, e)))
    }

    async fn access_token(&self) -> Result<String, AppError> {
        match self.auth {
            AuthMode::Emulator => Ok("owner".to_string()),
            AuthMode::Metadata => self.metadata_token().await,
        }
    }

    async fn metadata_token(&self) -> Result<String, AppError> {
        {
            let cache = self.token_cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.expires_at > Instant::now() {
                    return Ok(entry.token.clone());
                }
            }
        }

        let response = self
            .http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| AppError::IdentityApi(format!("Metadata token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::IdentityApi(format!(
                "Metadata token request returned {}",
                response.status()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| AppError::IdentityApi(format!("Invalid metadata token: {}", e)))?;

        let ttl = Duration::from_secs(token.expires_in.max(TOKEN_EXPIRY_SLACK.as_secs()))
            - TOKEN_EXPIRY_SLACK;
        *self.token_cache.write().await = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + ttl,
        });

        Ok(token.access_token)
    }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    users: Option<Vec<RawAccount>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAccount {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    /// JSON-encoded custom-claims map
    custom_attributes: Option<String>,
}
