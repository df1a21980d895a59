//! Stripe API lookups used to enrich webhook events.
//!
//! Only two reads are needed: the subscription (for price and period end) and
//! the customer (for an email when the invoice does not carry one).

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use thiserror::Error;
use tracing::error;
use url::Url;

/// Errors returned by the billing provider
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Transport-level failure
    #[error("Stripe request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Stripe answered with an error status
    #[error("Stripe API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from Stripe, or the raw body
        message: String,
    },

    /// API base URL cannot carry path segments
    #[error("Invalid Stripe API base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Billing facts of a subscription
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDetails {
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Contact facts of a customer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

/// Read access to the payment provider
#[async_trait::async_trait]
pub trait BillingProvider: Send + Sync + 'static {
    /// Retrieve a subscription by ID
    async fn retrieve_subscription(&self, id: &str) -> Result<SubscriptionDetails, ProviderError>;

    /// Retrieve a customer by ID
    async fn retrieve_customer(&self, id: &str) -> Result<CustomerDetails, ProviderError>;
}

/// Minimal Stripe client built on reqwest.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    api_base: Url,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    current_period_end: Option<i64>,
    #[serde(default)]
    items: StripeSubscriptionItems,
}

#[derive(Debug, Default, Deserialize)]
struct StripeSubscriptionItems {
    #[serde(default)]
    data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItem {
    current_period_end: Option<i64>,
    price: Option<StripePrice>,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    email: Option<String>,
}

impl StripeSubscription {
    /// Period end from the subscription, falling back to the first item where
    /// newer API versions put it.
    fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|item| item.current_period_end))
    }

    fn into_details(self) -> SubscriptionDetails {
        let current_period_end = self
            .period_end()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        let price_id = self
            .items
            .data
            .into_iter()
            .next()
            .and_then(|item| item.price)
            .map(|price| price.id);

        SubscriptionDetails {
            price_id,
            current_period_end,
        }
    }
}

impl StripeClient {
    /// Create a client with a bounded per-request timeout
    pub fn new(
        secret_key: impl Into<String>,
        api_base: Url,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            secret_key: secret_key.into(),
            api_base,
        })
    }

    fn endpoint(&self, resource: &str, id: &str) -> Result<Url, ProviderError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidBaseUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(["v1", resource, id]);
        Ok(url)
    }

    async fn get(&self, url: Url, context: &str) -> Result<reqwest::Response, ProviderError> {
        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await?;
        Self::ensure_success(resp, context).await
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?details.as_ref().and_then(|d| d.type_.as_deref()),
            stripe_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
            context = %context,
            "stripe api request failed"
        );

        Err(ProviderError::Api {
            status: status.as_u16(),
            message: details.and_then(|d| d.message).unwrap_or(body),
        })
    }
}

#[async_trait::async_trait]
impl BillingProvider for StripeClient {
    async fn retrieve_subscription(&self, id: &str) -> Result<SubscriptionDetails, ProviderError> {
        let url = self.endpoint("subscriptions", id)?;
        let resp = self.get(url, "retrieve subscription").await?;
        let subscription: StripeSubscription = resp.json().await?;
        Ok(subscription.into_details())
    }

    async fn retrieve_customer(&self, id: &str) -> Result<CustomerDetails, ProviderError> {
        let url = self.endpoint("customers", id)?;
        let resp = self.get(url, "retrieve customer").await?;
        let customer: StripeCustomer = resp.json().await?;
        Ok(CustomerDetails {
            email: customer.email.filter(|e| !e.is_empty()),
        })
    }
}
