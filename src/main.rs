// SPDX-License-Identifier: MIT

//! Studio Platform API Server
//!
//! Backs the community SPA: group/claims synchronization with the
//! identity provider, team-application intake, and Stripe donations.

use std::sync::Arc;
use studio_api::{
    config::Config,
    db::FirestoreDb,
    services::{GroupService, IdTokenVerifier, IdentityService, StripeService},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Studio Platform API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Identity admin client (claims writes, lookups, deletion)
    let identity = IdentityService::new(&config.gcp_project_id);
    tracing::info!("Identity admin client initialized");

    // Stripe client; payments stay disabled without a secret key
    let stripe = StripeService::new(config.stripe_secret_key.clone());
    if !stripe.is_configured() {
        tracing::warn!("STRIPE_SECRET_KEY not set; payment routes disabled");
    }

    let groups = GroupService::new(db.clone(), identity.clone());

    let id_token_verifier =
        Arc::new(IdTokenVerifier::new(&config).expect("Failed to initialize ID-token verifier"));

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        identity,
        stripe,
        groups,
        id_token_verifier,
    });

    // Build router
    let app = studio_api::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("studio_api=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
