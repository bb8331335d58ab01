//! User profile model for storage and API.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// User profile stored in Firestore.
///
/// Profile documents are merge-written from several triggers, so every
/// field tolerates being absent in a previously stored document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    /// Account uid (also used as document ID)
    pub uid: String,
    /// Email address (may be None if the provider did not share one)
    pub email: Option<String>,
    /// Resolved display name
    pub display_name: Option<String>,
    /// Resolved avatar URL
    pub photo_url: Option<String>,
    /// Display name recorded from GitHub sign-ins
    pub github_display_name: Option<String>,
    /// Role tags mirrored into issued token claims
    pub groups: Vec<String>,
    /// True while a team application awaits an admin group edit
    pub is_applying: bool,
    /// Submitted team application, if any
    pub application: Option<Application>,
    /// Donation history, newest last
    pub transactions: TransactionLog,
    /// When the account was first created
    pub created_at: Option<String>,
    /// Last server-side modification
    pub updated_at: Option<String>,
    /// Last sign-in
    pub last_login: Option<String>,
}

/// Team application attached to a user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Application {
    pub developer_type: String,
    /// Years of experience
    pub experience: f64,
    #[serde(default)]
    pub languages: Vec<String>,
    pub address: String,
    pub phone: String,
    pub portfolio: String,
    #[serde(default)]
    pub other_links: String,
    pub about: String,
    pub submitted_at: String,
}

/// One recorded donation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Transaction {
    /// Amount actually received, in the smallest currency unit
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub amount: i64,
    pub currency: String,
    pub payment_intent_id: String,
    pub product_id: Option<String>,
    pub note: Option<String>,
    pub created_at: String,
}

/// Bounded donation history.
///
/// Appends go to the back; once the cap is reached every push evicts the
/// oldest entry from the front, so the length bound holds mechanically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionLog(VecDeque<Transaction>);

impl TransactionLog {
    /// Only the 100 most recent transactions are retained.
    pub const MAX_ENTRIES: usize = 100;

    pub fn push(&mut self, txn: Transaction) {
        self.0.push_back(txn);
        while self.0.len() > Self::MAX_ENTRIES {
            self.0.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.0.iter()
    }

    /// Oldest retained transaction.
    pub fn oldest(&self) -> Option<&Transaction> {
        self.0.front()
    }

    /// Most recently appended transaction.
    pub fn newest(&self) -> Option<&Transaction> {
        self.0.back()
    }

    pub fn total_amount(&self) -> i64 {
        self.0.iter().map(|t| t.amount).sum()
    }

    pub fn to_vec(&self) -> Vec<Transaction> {
        self.0.iter().cloned().collect()
    }
}
