// SPDX-License-Identifier: MIT

//! Integration tests for group synchronization.
//!
//! These tests require both emulators to be running:
//!   FIRESTORE_EMULATOR_HOST=localhost:8080
//!   FIREBASE_AUTH_EMULATOR_HOST=localhost:9099

use studio_api::db::FirestoreDb;
use studio_api::models::{Transaction, TransactionLog};
use studio_api::services::groups::SignInContext;
use studio_api::services::{GroupService, IdentityService};

mod common;

const PROJECT_ID: &str = "test-project";

async fn test_services() -> (FirestoreDb, IdentityService, GroupService) {
    let db = FirestoreDb::new(PROJECT_ID)
        .await
        .expect("Failed to connect to Firestore emulator");
    let identity = IdentityService::new(PROJECT_ID);
    let groups = GroupService::new(db.clone(), identity.clone());
    (db, identity, groups)
}

/// Create an account in the Auth emulator, returning its uid.
async fn create_emulator_account(email: &str) -> String {
    let host = std::env::var("FIREBASE_AUTH_EMULATOR_HOST").unwrap();
    let url = format!(
        "http://{host}/identitytoolkit.googleapis.com/v1/accounts:signUp?key=fake-api-key"
    );

    let response = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({
            "email": email,
            "password": "password123",
            "returnSecureToken": true
        }))
        .send()
        .await
        .expect("signUp request failed");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.unwrap();
    body["localId"].as_str().unwrap().to_string()
}

/// Generate a unique email for test isolation.
fn unique_email(tag: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{tag}-{nanos}@example.com")
}

fn donation(id: u32) -> Transaction {
    Transaction {
        amount: 500,
        currency: "usd".to_string(),
        payment_intent_id: format!("pi_{id}"),
        product_id: Some("donation".to_string()),
        note: None,
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

fn claim_groups(claims: &serde_json::Map<String, serde_json::Value>) -> Vec<String> {
    claims["groups"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_account_created_seeds_member_everywhere() {
    require_emulators!();
    let (db, identity, groups) = test_services().await;

    let email = unique_email("created");
    let uid = create_emulator_account(&email).await;

    groups.on_account_created(&uid, Some(&email)).await.unwrap();

    let profile = db.get_profile(&uid).await.unwrap().unwrap();
    assert_eq!(profile.groups, vec!["member"]);
    assert_eq!(profile.email.as_deref(), Some(email.as_str()));
    let created_at = profile.created_at.clone().expect("createdAt set");

    let record = identity.get_user(&uid).await.unwrap();
    assert_eq!(claim_groups(&record.custom_claims), vec!["member"]);

    // Provider retries must converge to the same state.
    groups.on_account_created(&uid, Some(&email)).await.unwrap();
    let profile = db.get_profile(&uid).await.unwrap().unwrap();
    assert_eq!(profile.groups, vec!["member"]);
    assert_eq!(profile.created_at.as_deref(), Some(created_at.as_str()));
}

#[tokio::test]
async fn test_before_sign_in_from_missing_document_yields_member() {
    require_emulators!();
    let (db, _identity, groups) = test_services().await;

    let email = unique_email("signin");
    let uid = create_emulator_account(&email).await;

    let ctx = SignInContext {
        uid: uid.clone(),
        email: Some(email.clone()),
        sign_in_provider: Some("password".to_string()),
        ..Default::default()
    };

    let session_groups = groups.on_before_sign_in(&ctx).await.unwrap();
    assert_eq!(session_groups, vec!["member"]);

    let profile = db.get_profile(&uid).await.unwrap().unwrap();
    assert_eq!(profile.groups, vec!["member"]);
    // No provider or account name: the email is the next fallback.
    assert_eq!(profile.display_name.as_deref(), Some(email.as_str()));
    assert!(profile.last_login.is_some());
}

#[tokio::test]
async fn test_before_sign_in_forces_member_and_dedupes() {
    require_emulators!();
    let (db, _identity, groups) = test_services().await;

    let email = unique_email("dedupe");
    let uid = create_emulator_account(&email).await;

    let mut profile = studio_api::models::UserProfile {
        uid: uid.clone(),
        ..Default::default()
    };
    profile.groups = vec![
        "donor".to_string(),
        "donor".to_string(),
        "subscriber".to_string(),
    ];
    db.upsert_profile(&profile).await.unwrap();

    let ctx = SignInContext {
        uid: uid.clone(),
        email: Some(email),
        ..Default::default()
    };

    let session_groups = groups.on_before_sign_in(&ctx).await.unwrap();
    assert_eq!(session_groups, vec!["member", "donor", "subscriber"]);
}

#[tokio::test]
async fn test_github_display_name_survives_password_sign_in() {
    require_emulators!();
    let (db, _identity, groups) = test_services().await;

    let email = unique_email("github");
    let uid = create_emulator_account(&email).await;

    let github_ctx = SignInContext {
        uid: uid.clone(),
        email: Some(email.clone()),
        provider_name: Some("octocat".to_string()),
        sign_in_provider: Some("github.com".to_string()),
        ..Default::default()
    };
    groups.on_before_sign_in(&github_ctx).await.unwrap();

    let profile = db.get_profile(&uid).await.unwrap().unwrap();
    assert_eq!(profile.github_display_name.as_deref(), Some("octocat"));
    assert_eq!(profile.display_name.as_deref(), Some("octocat"));

    // A later password sign-in must not clobber the recorded name.
    let password_ctx = SignInContext {
        uid: uid.clone(),
        email: Some(email.clone()),
        sign_in_provider: Some("password".to_string()),
        ..Default::default()
    };
    groups.on_before_sign_in(&password_ctx).await.unwrap();

    let profile = db.get_profile(&uid).await.unwrap().unwrap();
    assert_eq!(profile.github_display_name.as_deref(), Some("octocat"));
}

#[tokio::test]
async fn test_update_groups_sanitizes_and_clears_applying() {
    require_emulators!();
    let (db, identity, groups) = test_services().await;

    let email = unique_email("admin-edit");
    let uid = create_emulator_account(&email).await;

    // Unrelated claims keys must survive the group rewrite.
    let mut extra = serde_json::Map::new();
    extra.insert("tier".to_string(), serde_json::json!("gold"));
    identity.set_custom_claims(&uid, &extra).await.unwrap();

    let mut profile = studio_api::models::UserProfile {
        uid: uid.clone(),
        is_applying: true,
        ..Default::default()
    };
    profile.groups = vec!["member".to_string()];
    db.upsert_profile(&profile).await.unwrap();

    let requested = vec![
        "admin".to_string(),
        "hacker".to_string(),
        "admin".to_string(),
    ];
    let result = groups.update_groups(&uid, &requested).await.unwrap();
    assert_eq!(result, vec!["admin", "member"]);

    let profile = db.get_profile(&uid).await.unwrap().unwrap();
    assert_eq!(profile.groups, vec!["admin", "member"]);
    assert!(!profile.is_applying);

    let record = identity.get_user(&uid).await.unwrap();
    assert_eq!(claim_groups(&record.custom_claims), vec!["admin", "member"]);
    assert_eq!(record.custom_claims["tier"], serde_json::json!("gold"));
}

#[tokio::test]
async fn test_grant_donor_never_removes_roles() {
    require_emulators!();
    let (db, identity, groups) = test_services().await;

    let email = unique_email("donor");
    let uid = create_emulator_account(&email).await;

    let mut profile = studio_api::models::UserProfile {
        uid: uid.clone(),
        ..Default::default()
    };
    profile.groups = vec!["member".to_string(), "subscriber".to_string()];
    db.upsert_profile(&profile).await.unwrap();

    groups.grant_donor(&uid, donation(1)).await.unwrap();

    let profile = db.get_profile(&uid).await.unwrap().unwrap();
    let doc_groups: std::collections::HashSet<String> = profile.groups.into_iter().collect();
    let expected: std::collections::HashSet<String> = ["member", "subscriber", "donor"]
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(doc_groups, expected);

    assert_eq!(profile.transactions.len(), 1);
    assert_eq!(
        profile.transactions.newest().unwrap().payment_intent_id,
        "pi_1"
    );

    let record = identity.get_user(&uid).await.unwrap();
    let token_groups: std::collections::HashSet<String> =
        claim_groups(&record.custom_claims).into_iter().collect();
    assert_eq!(token_groups, expected);
}

#[tokio::test]
async fn test_transaction_history_caps_at_100() {
    require_emulators!();
    let (db, _identity, groups) = test_services().await;

    let email = unique_email("cap");
    let uid = create_emulator_account(&email).await;

    for id in 0..(TransactionLog::MAX_ENTRIES as u32 + 1) {
        groups.grant_donor(&uid, donation(id)).await.unwrap();
    }

    let profile = db.get_profile(&uid).await.unwrap().unwrap();
    assert_eq!(profile.transactions.len(), TransactionLog::MAX_ENTRIES);
    // pi_0 was evicted; newest stays last
    assert_eq!(
        profile.transactions.oldest().unwrap().payment_intent_id,
        "pi_1"
    );
    assert_eq!(
        profile.transactions.newest().unwrap().payment_intent_id,
        "pi_100"
    );
}
