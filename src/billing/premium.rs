//! Keeps the profile's `is_premium` flag in line with subscription status.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::billing::store::ProfileStore;
use crate::metrics::global_metrics;

/// Best-effort writer of the premium flag.
///
/// The subscription record is the source of truth and is written first, so a
/// failure here is logged and swallowed.
#[derive(Clone)]
pub struct PremiumSync {
    profiles: Arc<dyn ProfileStore>,
}

impl PremiumSync {
    /// Create a synchronizer over a profile store
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    /// Set the flag for `user_id`. Does nothing when there is no user.
    pub async fn set_premium(&self, user_id: Option<&str>, is_premium: bool) {
        let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
            debug!(is_premium, "No user for premium flag update, skipping");
            return;
        };

        match self.profiles.set_premium(user_id, is_premium).await {
            Ok(()) => debug!(user_id = %user_id, is_premium, "Premium flag updated"),
            Err(e) => {
                global_metrics().record_premium_sync_failure();
                warn!(
                    user_id = %user_id,
                    is_premium,
                    error = %e,
                    "Failed to update premium flag"
                );
            }
        }
    }
}
