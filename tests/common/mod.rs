// SPDX-License-Identifier: MIT

use std::sync::Arc;
use studio_api::config::Config;
use studio_api::db::FirestoreDb;
use studio_api::routes::create_router;
use studio_api::services::id_token::{sign_insecure_hs256, FirebaseClaims, IdTokenClaims};
use studio_api::services::{GroupService, IdTokenVerifier, IdentityService, StripeService};
use studio_api::AppState;

/// Shared secret the test verifier accepts.
pub const TEST_TOKEN_SECRET: &[u8] = b"test_token_secret";

/// Check if the Firestore and Auth emulators are available.
#[allow(dead_code)]
pub fn emulators_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
        && std::env::var("FIREBASE_AUTH_EMULATOR_HOST").is_ok()
}

/// Skip test with message if the emulators are not available.
#[macro_export]
macro_rules! require_emulators {
    () => {
        if !crate::common::emulators_available() {
            eprintln!(
                "⚠️  Skipping: FIRESTORE_EMULATOR_HOST / FIREBASE_AUTH_EMULATOR_HOST not set"
            );
            return;
        }
    };
}

/// Create a test app with offline mock dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_stripe(None)
}

/// Create a test app with a (fake) Stripe secret configured.
///
/// Payment validation runs before any Stripe call, so handlers reach
/// their input checks without network access.
#[allow(dead_code)]
pub fn create_test_app_with_stripe(stripe_secret: Option<&str>) -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let db = FirestoreDb::new_mock();
    let identity = IdentityService::new_mock();
    let stripe = StripeService::new(stripe_secret.map(str::to_string));
    let groups = GroupService::new(db.clone(), identity.clone());
    let id_token_verifier = Arc::new(IdTokenVerifier::new_insecure_hs256(
        &config,
        TEST_TOKEN_SECRET,
    ));

    let state = Arc::new(AppState {
        config,
        db,
        identity,
        stripe,
        groups,
        id_token_verifier,
    });

    (create_router(state.clone()), state)
}

/// Mint a bearer ID token carrying the given group claims.
#[allow(dead_code)]
pub fn create_test_token(uid: &str, groups: &[&str]) -> String {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = IdTokenClaims {
        iss: "https://securetoken.google.com/test-project".to_string(),
        aud: "test-project".to_string(),
        sub: uid.to_string(),
        exp: now + 3600,
        iat: Some(now),
        email: Some(format!("{uid}@example.com")),
        name: None,
        picture: None,
        groups: Some(groups.iter().map(|g| g.to_string()).collect()),
        firebase: Some(FirebaseClaims {
            sign_in_provider: Some("password".to_string()),
        }),
    };

    sign_insecure_hs256(&claims, TEST_TOKEN_SECRET).expect("Failed to mint test token")
}
