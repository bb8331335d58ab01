// SPDX-License-Identifier: MIT

//! Studio community platform backend.
//!
//! Serves the SPA's API: identity-trigger hooks that keep group claims in
//! sync with Firestore profile documents, the team-application intake,
//! and the donation flow on top of Stripe.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;

use config::Config;
use db::FirestoreDb;
use services::{GroupService, IdTokenVerifier, IdentityService, StripeService};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub identity: IdentityService,
    pub stripe: StripeService,
    pub groups: GroupService,
    pub id_token_verifier: Arc<IdTokenVerifier>,
}
