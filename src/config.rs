//! Service configuration loaded from environment variables.
//!
//! Secrets are never read from files or CLI flags, only from the environment:
//!
//! - `STRIPE_WEBHOOK_SECRET`, `STRIPE_SECRET_KEY`: see [`StripeWebhookConfig`]
//! - `SUPABASE_URL`, `SUPABASE_SERVICE_ROLE_KEY`: see [`PostgrestConfig`]
//! - `BILLING_SYNC_HTTP_TIMEOUT_SECS`: timeout for every outbound call (default: 10)

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::billing::postgrest::PostgrestConfig;
use crate::stripe::config::StripeWebhookConfig;

/// Default outbound HTTP timeout
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required variable is not set
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    /// A variable is set but empty
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// A variable could not be parsed
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Result type for configuration loading
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Everything the server needs to run
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub stripe: StripeWebhookConfig,
    pub store: PostgrestConfig,
    /// Timeout applied to each Stripe and Supabase request
    pub http_timeout: Duration,
}

impl AppConfig {
    /// Load the full configuration from the environment
    pub fn from_env() -> ConfigResult<Self> {
        let stripe = StripeWebhookConfig::from_env()?;
        let store = PostgrestConfig::from_env()?;
        let http_timeout = Duration::from_secs(positive_secs(
            "BILLING_SYNC_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);

        info!(
            supabase_url = %store.url,
            stripe_api_base = %stripe.api_base,
            http_timeout_secs = http_timeout.as_secs(),
            "Configuration loaded"
        );

        Ok(Self {
            stripe,
            store,
            http_timeout,
        })
    }
}

/// Read a required, non-empty variable
pub(crate) fn required_var(name: &'static str) -> ConfigResult<String> {
    let value = env::var(name).map_err(|_| ConfigError::Missing(name))?;
    if value.trim().is_empty() {
        return Err(ConfigError::Empty(name));
    }
    Ok(value)
}

/// Read an optional integer number of seconds
pub(crate) fn secs_var(name: &'static str, default: u64) -> ConfigResult<u64> {
    match env::var(name) {
        Ok(value) => parse_secs(name, &value),
        Err(_) => Ok(default),
    }
}

/// Read an optional number of seconds that must be greater than zero
pub(crate) fn positive_secs(name: &'static str, default: u64) -> ConfigResult<u64> {
    let secs = secs_var(name, default)?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(secs)
}

fn parse_secs(name: &'static str, value: &str) -> ConfigResult<u64> {
    value.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
