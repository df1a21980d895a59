//! Subscription reconciliation
//!
//! Turns verified Stripe events into durable subscription records:
//!
//! ```text
//! event -> UserResolver -> SubscriptionMerger -> PremiumSync
//!              |                  |                  |
//!         ProfileStore    SubscriptionStore     ProfileStore
//! ```
//!
//! The stores are traits; [`postgrest`] talks to Supabase and [`memory`] keeps
//! everything in process for tests.

pub mod memory;
pub mod merge;
pub mod postgrest;
pub mod premium;
pub mod reconciler;
pub mod resolver;
pub mod store;

pub use memory::{InMemoryProfileStore, InMemorySubscriptionStore, StaticBillingProvider};
pub use merge::{merge_record, MergeError, SubscriptionMerger};
pub use postgrest::{PostgrestConfig, PostgrestStore};
pub use premium::PremiumSync;
pub use reconciler::Reconciler;
pub use resolver::{ResolutionError, ResolutionSource, ResolvedUser, UserResolver};
pub use store::{
    ProfileStore, StoreError, StoreResult, SubscriptionRecord, SubscriptionStatus,
    SubscriptionStore, SubscriptionUpdate,
};
