//! Error types for billing-sync
//!
//! Each layer has its own `thiserror` enum next to the code that raises it;
//! [`Error`] aggregates them for setup code and the binary.

use thiserror::Error;

use crate::billing::store::StoreError;
use crate::config::ConfigError;
use crate::stripe::client::ProviderError;
use crate::stripe::error::StripeWebhookError;

/// The main error type for billing-sync
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Webhook pipeline errors
    #[error("Webhook error: {0}")]
    Webhook(#[from] StripeWebhookError),

    /// Subscription or profile store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Stripe API errors
    #[error("Stripe error: {0}")]
    Provider(#[from] ProviderError),

    /// I/O errors (binding the listener, serving)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for billing-sync operations
pub type Result<T> = std::result::Result<T, Error>;
