// SPDX-License-Identifier: MIT

//! Stripe API client for payment and setup intents.
//!
//! Amounts are in the smallest currency unit throughout. The confirm path
//! never trusts client-supplied amounts; it re-reads the intent from
//! Stripe and uses the amount the processor reports as received.

use crate::error::AppError;
use serde::Deserialize;
use std::collections::HashMap;

const DEFAULT_BASE_URL: &str = "https://api.stripe.com/v1";

/// Stripe API client.
///
/// Built without a secret key, every call fails with `FailedPrecondition`
/// so the payment routes surface "not configured" instead of a transport
/// error.
#[derive(Clone)]
pub struct StripeService {
    http: reqwest::Client,
    base_url: String,
    secret_key: Option<String>,
}

/// Payment intent as reported by Stripe.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_received: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Setup intent as reported by Stripe.
#[derive(Debug, Clone, Deserialize)]
pub struct SetupIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
}

impl PaymentIntent {
    /// Amount to record for a confirmed donation: what Stripe received,
    /// falling back to the requested amount for older API versions.
    pub fn recorded_amount(&self) -> i64 {
        if self.amount_received > 0 {
            self.amount_received
        } else {
            self.amount
        }
    }
}

impl StripeService {
    /// Create a new Stripe client. `secret_key` of None disables payments.
    pub fn new(secret_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            secret_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    /// Fail early when no secret key is configured.
    ///
    /// Payment handlers call this before validating their input, so an
    /// unconfigured deployment reports the precondition rather than a
    /// field error.
    pub fn ensure_configured(&self) -> Result<(), AppError> {
        self.secret_key().map(|_| ())
    }

    fn secret_key(&self) -> Result<&str, AppError> {
        self.secret_key.as_deref().ok_or_else(|| {
            AppError::FailedPrecondition(
                "Stripe secret key is not configured. Set STRIPE_SECRET_KEY.".to_string(),
            )
        })
    }

    /// Create a payment intent with automatic payment methods.
    pub async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        product_id: &str,
        uid: &str,
    ) -> Result<PaymentIntent, AppError> {
        let key = self.secret_key()?;

        let amount = amount.to_string();
        let params = [
            ("amount", amount.as_str()),
            ("currency", currency),
            ("automatic_payment_methods[enabled]", "true"),
            ("metadata[productId]", product_id),
            ("metadata[uid]", uid),
        ];

        let response = self
            .http
            .post(format!("{}/payment_intents", self.base_url))
            .bearer_auth(key)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::PaymentApi(e.to_string()))?;

        check_response_json(response).await
    }

    /// Create a setup intent for storing a payment method.
    pub async fn create_setup_intent(
        &self,
        usage: &str,
        uid: &str,
    ) -> Result<SetupIntent, AppError> {
        let key = self.secret_key()?;

        let params = [("usage", usage), ("metadata[uid]", uid)];

        let response = self
            .http
            .post(format!("{}/setup_intents", self.base_url))
            .bearer_auth(key)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::PaymentApi(e.to_string()))?;

        check_response_json(response).await
    }

    /// Fetch the authoritative state of a payment intent.
    pub async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, AppError> {
        let key = self.secret_key()?;

        let response = self
            .http
            .get(format!("{}/payment_intents/{}", self.base_url, id))
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| AppError::PaymentApi(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("Payment intent {} not found", id)));
        }

        check_response_json(response).await
    }
}

/// Check response status and decode JSON, surfacing Stripe error bodies.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::PaymentApi(format!(
            "Stripe returned {}: {}",
            status, body
        )));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::PaymentApi(format!("Invalid Stripe response: {}", e)))
}
