//! Subscription and profile records plus the store seams they are read and
//! written through.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a subscription or profile store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport-level failure talking to the store
    #[error("Store request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The store answered with a non-success status
    #[error("Store returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as returned
        body: String,
    },

    /// The store answered with a body we could not decode
    #[error("Unexpected store response: {0}")]
    Decode(String),

    /// Store endpoint could not be built
    #[error("Invalid store URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Backend-specific failure
    #[error("{0}")]
    Backend(String),
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Status of a stored subscription.
///
/// These are the only states a record moves through; there is no pending or
/// trialing state on our side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }

    /// Whether this status grants the premium entitlement
    pub fn is_premium(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the `subscriptions` table, keyed by `user_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Internal user identifier (unique)
    pub user_id: String,
    /// Stripe customer ID (cus_...)
    #[serde(rename = "stripe_customer_id")]
    pub customer_id: Option<String>,
    /// Stripe subscription ID (sub_...)
    #[serde(rename = "stripe_subscription_id")]
    pub subscription_id: Option<String>,
    pub status: SubscriptionStatus,
    /// Stripe price ID of the plan
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub customer_email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Fields carried by a single event, to be merged into the stored record.
///
/// `status` is always applied. Every other field is applied only when set
/// and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub status: SubscriptionStatus,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub customer_email: Option<String>,
}

impl SubscriptionUpdate {
    /// An update that carries only a status
    pub fn status_only(status: SubscriptionStatus) -> Self {
        Self {
            status,
            customer_id: None,
            subscription_id: None,
            price_id: None,
            current_period_end: None,
            customer_email: None,
        }
    }
}

/// Persistence for subscription records
#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync + 'static {
    /// Fetch the record for a user, if any
    async fn find_by_user(&self, user_id: &str) -> StoreResult<Option<SubscriptionRecord>>;

    /// Fetch the record holding a given Stripe subscription ID, if any
    async fn find_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Option<SubscriptionRecord>>;

    /// Insert or replace the record, with `user_id` as the conflict target
    async fn upsert(&self, record: &SubscriptionRecord) -> StoreResult<()>;
}

/// Access to user profiles, limited to email lookup and the premium flag
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync + 'static {
    /// Exact-match lookup of a profile ID by email
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<String>>;

    /// Write the `is_premium` flag for a user
    async fn set_premium(&self, user_id: &str, is_premium: bool) -> StoreResult<()>;
}
