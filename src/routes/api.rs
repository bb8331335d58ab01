// SPDX-License-Identifier: MIT

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Application, Transaction};
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require authentication via bearer ID token).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/applications", post(submit_application))
        .route("/api/transactions", get(get_transactions))
        .route("/api/payments/intents", post(create_payment_intent))
        .route("/api/payments/setup-intents", post(create_setup_intent))
        .route("/api/donations/confirm", post(confirm_donation))
}

/// Generic success acknowledgment.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SuccessResponse {
    pub success: bool,
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MeResponse {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub groups: Vec<String>,
    pub is_applying: bool,
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let profile = state
        .db
        .get_profile(&user.uid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.uid)))?;

    Ok(Json(MeResponse {
        uid: profile.uid,
        email: profile.email,
        display_name: profile.display_name,
        photo_url: profile.photo_url,
        groups: profile.groups,
        is_applying: profile.is_applying,
    }))
}

// ─── Team Application Intake ─────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SubmitApplicationRequest {
    developer_type: Option<String>,
    /// Accepted as a JSON number or a numeric string
    experience: Option<serde_json::Value>,
    languages: Option<Vec<String>>,
    address: Option<String>,
    phone: Option<String>,
    portfolio: Option<String>,
    other_links: Option<String>,
    about: Option<String>,
}

impl SubmitApplicationRequest {
    /// Validate into a storable application record.
    ///
    /// Fields are checked in a fixed order and the first offending one
    /// fails the whole call by name.
    fn into_application(self) -> Result<Application> {
        let developer_type = required_trimmed(self.developer_type.as_deref(), "developerType")?;
        let experience = parse_experience(self.experience.as_ref())?;
        let address = required_trimmed(self.address.as_deref(), "address")?;
        let phone = required_trimmed(self.phone.as_deref(), "phone")?;
        let portfolio = required_trimmed(self.portfolio.as_deref(), "portfolio")?;
        let about = required_trimmed(self.about.as_deref(), "about")?;

        let languages = self
            .languages
            .unwrap_or_default()
            .iter()
            .map(|lang| lang.trim())
            .filter(|lang| !lang.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Application {
            developer_type,
            experience,
            languages,
            address,
            phone,
            portfolio,
            other_links: self
                .other_links
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            about,
            submitted_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

fn required_trimmed(value: Option<&str>, field: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::InvalidArgument(format!("{field} is required."))),
    }
}

fn parse_experience(value: Option<&serde_json::Value>) -> Result<f64> {
    let parsed = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(years) if years.is_finite() && years >= 0.0 => Ok(years),
        _ => Err(AppError::InvalidArgument(
            "experience must be a non-negative number.".to_string(),
        )),
    }
}

/// Submit a team application onto the caller's profile.
async fn submit_application(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<SubmitApplicationRequest>,
) -> Result<Json<SuccessResponse>> {
    let application = payload.into_application()?;

    let mut profile = state.db.get_profile(&user.uid).await?.unwrap_or_default();
    profile.uid = user.uid.clone();
    profile.is_applying = true;

    tracing::info!(
        uid = %user.uid,
        developer_type = %application.developer_type,
        experience = application.experience,
        "Application received"
    );

    profile.application = Some(application);
    state.db.upsert_profile(&profile).await?;

    Ok(Json(SuccessResponse { success: true }))
}

// ─── Transactions ────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TransactionsResponse {
    pub transactions: Vec<Transaction>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_amount: i64,
    pub currency: String,
}

/// Get the caller's donation history.
async fn get_transactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TransactionsResponse>> {
    let profile = state.db.get_profile(&user.uid).await?.unwrap_or_default();

    let total_amount = profile.transactions.total_amount();
    let transactions = profile.transactions.to_vec();
    let currency = transactions
        .first()
        .map(|t| t.currency.clone())
        .unwrap_or_else(|| "usd".to_string());

    Ok(Json(TransactionsResponse {
        transactions,
        total_amount,
        currency,
    }))
}

// ─── Payments ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CreatePaymentIntentRequest {
    product_id: Option<String>,
    /// Smallest currency unit; must be a positive integer
    amount: Option<f64>,
    currency: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
}

fn parse_amount(amount: Option<f64>) -> Result<i64> {
    match amount {
        Some(a) if a.is_finite() && a.fract() == 0.0 && a > 0.0 && a <= i64::MAX as f64 => {
            Ok(a as i64)
        }
        _ => Err(AppError::InvalidArgument(
            "Amount must be a positive integer (in the smallest currency unit).".to_string(),
        )),
    }
}

/// Create a Stripe payment intent for a one-off donation.
async fn create_payment_intent(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreatePaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>> {
    state.stripe.ensure_configured()?;

    let product_id = required_trimmed(payload.product_id.as_deref(), "productId")
        .map_err(|_| AppError::InvalidArgument("A valid productId is required.".to_string()))?;
    let amount = parse_amount(payload.amount)?;
    let currency = payload
        .currency
        .map(|c| c.to_lowercase())
        .unwrap_or_else(|| "usd".to_string());

    let intent = state
        .stripe
        .create_payment_intent(amount, &currency, &product_id, &user.uid)
        .await?;

    let client_secret = intent
        .client_secret
        .ok_or_else(|| AppError::PaymentApi("Payment intent missing client secret".to_string()))?;

    Ok(Json(PaymentIntentResponse {
        client_secret,
        payment_intent_id: intent.id,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CreateSetupIntentRequest {
    usage: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SetupIntentResponse {
    pub client_secret: String,
    pub setup_intent_id: String,
}

/// Create a Stripe setup intent for storing a payment method.
async fn create_setup_intent(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateSetupIntentRequest>,
) -> Result<Json<SetupIntentResponse>> {
    state.stripe.ensure_configured()?;

    let usage = payload.usage.unwrap_or_else(|| "off_session".to_string());

    let intent = state.stripe.create_setup_intent(&usage, &user.uid).await?;

    let client_secret = intent
        .client_secret
        .ok_or_else(|| AppError::PaymentApi("Setup intent missing client secret".to_string()))?;

    Ok(Json(SetupIntentResponse {
        client_secret,
        setup_intent_id: intent.id,
    }))
}

// ─── Donation Confirmation ───────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfirmDonationRequest {
    payment_intent_id: Option<String>,
}

/// Record a completed donation.
///
/// The intent's status and amount are re-read from Stripe; the client
/// only names the intent.
async fn confirm_donation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ConfirmDonationRequest>,
) -> Result<Json<SuccessResponse>> {
    state.stripe.ensure_configured()?;

    let payment_intent_id = required_trimmed(payload.payment_intent_id.as_deref(), "paymentIntentId")
        .map_err(|_| {
            AppError::InvalidArgument("A valid paymentIntentId is required.".to_string())
        })?;

    let intent = state.stripe.retrieve_payment_intent(&payment_intent_id).await?;

    if intent.status != "succeeded" {
        return Err(AppError::FailedPrecondition(
            "Payment is not complete.".to_string(),
        ));
    }

    let txn = Transaction {
        amount: intent.recorded_amount(),
        currency: intent.currency.to_lowercase(),
        payment_intent_id: intent.id.clone(),
        product_id: intent.metadata.get("productId").cloned(),
        note: None,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    state.groups.grant_donor(&user.uid, txn).await?;

    tracing::info!(uid = %user.uid, payment_intent_id = %intent.id, "Donation recorded");
    Ok(Json(SuccessResponse { success: true }))
}
