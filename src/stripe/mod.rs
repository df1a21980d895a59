//! Stripe Webhook Handler Module
//!
//! Receives Stripe webhooks and hands verified events to a
//! [`SubscriptionHandler`]:
//!
//! - **Signature Verification**: HMAC-SHA256 over the raw body, `stripe-signature` header
//! - **Typed Events**: a closed set of event variants; anything else is acknowledged as unhandled
//! - **Synchronous Processing**: the response code reflects whether the event was recorded
//! - **Enrichment**: subscription and customer lookups through [`BillingProvider`]
//!
//! # Architecture
//!
//! ```text
//! Request -> Signature Verify -> Parse -> Dispatch (under timeout) -> 200
//!                   |              |              |
//!                   v              v              v
//!                  400            400         400 / 500
//! ```
//!
//! Stripe redelivers on any non-2xx response, so every failure that could
//! leave the record stale is a 500 and nothing is retried in process.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use billing_sync::billing::{
//!     InMemoryProfileStore, InMemorySubscriptionStore, Reconciler, StaticBillingProvider,
//! };
//! use billing_sync::stripe::{stripe_webhook_router, StripeWebhookConfig, StripeWebhookState};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StripeWebhookConfig::from_env()?;
//! let reconciler = Arc::new(Reconciler::new(
//!     Arc::new(InMemorySubscriptionStore::new()),
//!     Arc::new(InMemoryProfileStore::new()),
//!     Arc::new(StaticBillingProvider::new()),
//! ));
//! let app = stripe_webhook_router(Arc::new(StripeWebhookState::new(&config, reconciler)));
//! // ... serve with axum
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod handler;
pub mod processor;
pub mod signature;

// Re-export commonly used items
pub use client::{BillingProvider, ProviderError, StripeClient};
pub use config::StripeWebhookConfig;
pub use error::{StripeWebhookError, StripeWebhookResult};
pub use events::{
    CheckoutSession, Invoice, ObjectRef, StripeEvent, StripeEventType, Subscription, WebhookEvent,
};
pub use extract::extract_subscription_id;
pub use handler::{stripe_webhook_handler, stripe_webhook_router, StripeWebhookState, WEBHOOK_PATH};
pub use processor::{EventOutcome, EventProcessor, SubscriptionHandler};
pub use signature::{SignatureVerifier, SIGNATURE_HEADER};
