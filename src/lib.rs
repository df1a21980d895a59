//! billing-sync - Stripe webhook reconciliation service
//!
//! Receives Stripe webhooks and keeps a durable, one-row-per-user subscription
//! record and the profile's premium flag in line with them.
//!
//! # Features
//!
//! - **Signature Verification**: HMAC-SHA256 check of the raw body
//! - **User Resolution**: direct reference, then metadata, then email lookup
//! - **Merge-Safe Upsert**: later events never blank out known fields
//! - **Retry Semantics**: 500 for anything Stripe should redeliver
//!
//! # Architecture
//!
//! ```text
//! Stripe ──▶ POST /webhooks/stripe ──▶ SignatureVerifier
//!                                            │
//!                                            ▼
//!                                      EventProcessor
//!                                            │
//!                                            ▼
//!                 ┌─────────────── Reconciler ───────────────┐
//!                 ▼                     ▼                    ▼
//!           UserResolver       SubscriptionMerger       PremiumSync
//!                 │                     │                    │
//!                 ▼                     ▼                    ▼
//!           profiles table    subscriptions table     profiles table
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use billing_sync::config::AppConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     billing_sync::server::serve(&config, "127.0.0.1:3000".parse()?).await?;
//!     Ok(())
//! }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod billing;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod server;
pub mod stripe;

// Re-exports for convenience
pub use billing::{merge_record, Reconciler, SubscriptionRecord, SubscriptionStatus};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use stripe::{SignatureVerifier, StripeEvent, StripeWebhookConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
