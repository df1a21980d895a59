//! Stripe webhook configuration
//!
//! - `STRIPE_WEBHOOK_SECRET` (required): endpoint signing secret (`whsec_...`)
//! - `STRIPE_SECRET_KEY` (required): API key used for enrichment lookups
//! - `STRIPE_API_BASE` (optional): API root, default `https://api.stripe.com`
//! - `STRIPE_WEBHOOK_TOLERANCE_SECS` (optional): max signature age, default 300, 0 disables
//! - `BILLING_SYNC_PROCESSING_TIMEOUT_SECS` (optional): bound on handling one event, default 25

use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::config::{positive_secs, required_var, secs_var, ConfigError, ConfigResult};

/// Default Stripe API root
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Default signature tolerance, matching Stripe's libraries
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Default processing timeout, under Stripe's own delivery timeout
pub const DEFAULT_PROCESSING_TIMEOUT_SECS: u64 = 25;

/// Configuration of the webhook endpoint and the Stripe API client
#[derive(Clone)]
pub struct StripeWebhookConfig {
    /// Endpoint signing secret; never logged
    pub webhook_secret: String,
    /// API secret key; never logged
    pub secret_key: String,
    pub api_base: Url,
    /// Max age of a signature timestamp, zero disables the check
    pub signature_tolerance: Duration,
    /// Bound on processing a single event
    pub processing_timeout: Duration,
}

impl std::fmt::Debug for StripeWebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeWebhookConfig")
            .field("webhook_secret", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("api_base", &self.api_base.as_str())
            .field("signature_tolerance", &self.signature_tolerance)
            .field("processing_timeout", &self.processing_timeout)
            .finish()
    }
}

impl StripeWebhookConfig {
    /// Load from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let webhook_secret = required_var("STRIPE_WEBHOOK_SECRET")?;
        if !webhook_secret.starts_with("whsec_") {
            warn!("STRIPE_WEBHOOK_SECRET does not look like a Stripe signing secret (whsec_...)");
        }

        let secret_key = required_var("STRIPE_SECRET_KEY")?;

        let api_base = std::env::var("STRIPE_API_BASE")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_base = Url::parse(&api_base).map_err(|e| ConfigError::Invalid {
            name: "STRIPE_API_BASE",
            reason: e.to_string(),
        })?;

        let tolerance = secs_var("STRIPE_WEBHOOK_TOLERANCE_SECS", DEFAULT_TOLERANCE_SECS)?;
        if tolerance == 0 {
            warn!("Webhook signature timestamp check disabled (STRIPE_WEBHOOK_TOLERANCE_SECS=0)");
        }

        let processing_timeout = positive_secs(
            "BILLING_SYNC_PROCESSING_TIMEOUT_SECS",
            DEFAULT_PROCESSING_TIMEOUT_SECS,
        )?;

        Ok(Self {
            webhook_secret,
            secret_key,
            api_base,
            signature_tolerance: Duration::from_secs(tolerance),
            processing_timeout: Duration::from_secs(processing_timeout),
        })
    }

    /// Configuration for tests: fixed secrets, no timestamp check
    pub fn test_config() -> Self {
        Self {
            webhook_secret: "whsec_test_secret".to_string(),
            secret_key: "sk_test_123".to_string(),
            api_base: Url::parse(DEFAULT_API_BASE).expect("static URL parses"),
            signature_tolerance: Duration::ZERO,
            processing_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let config = StripeWebhookConfig::test_config();
        let debug = format!("{config:?}");

        assert!(!debug.contains("whsec_test_secret"));
        assert!(!debug.contains("sk_test_123"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("api.stripe.com"));
    }
}
