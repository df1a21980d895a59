//! Webhook pipeline errors and their HTTP mapping.
//!
//! The status code is what Stripe sees, so it decides redelivery: 4xx means
//! the payload itself is unusable and Stripe should stop, 5xx means the event
//! was not durably recorded and must come again.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::billing::merge::MergeError;
use crate::billing::resolver::ResolutionError;
use crate::billing::store::StoreError;

/// Errors raised while receiving and processing a webhook
#[derive(Error, Debug)]
pub enum StripeWebhookError {
    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Signature timestamp {timestamp} is older than the {tolerance_secs}s tolerance")]
    TimestampOutOfTolerance { timestamp: i64, tolerance_secs: u64 },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("User resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Subscription update failed: {0}")]
    Merge(#[from] MergeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Processing timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for webhook operations
pub type StripeWebhookResult<T> = std::result::Result<T, StripeWebhookError>;

impl StripeWebhookError {
    /// HTTP status returned to Stripe
    pub fn status_code(&self) -> StatusCode {
        if self.is_retryable() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    /// Whether Stripe should redeliver the event
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MissingSignature
            | Self::InvalidSignature(_)
            | Self::TimestampOutOfTolerance { .. }
            | Self::InvalidPayload(_) => false,
            Self::Resolution(_) | Self::Merge(_) | Self::Store(_) | Self::Timeout(_) => true,
        }
    }

    /// Machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingSignature => "missing_signature",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::TimestampOutOfTolerance { .. } => "timestamp_out_of_tolerance",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Resolution(e) => e.reason(),
            Self::Merge(MergeError::Read { .. }) | Self::Store(_) => "store_read_failed",
            Self::Merge(MergeError::Write { .. }) => "store_write_failed",
            Self::Timeout(_) => "processing_timeout",
        }
    }
}

/// Error body sent back to Stripe
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl IntoResponse for StripeWebhookError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.reason(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
