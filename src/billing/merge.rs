//! Merge-safe upsert of subscription records.
//!
//! Webhook events each carry a partial view of a subscription: a payment
//! failure has no price or period end, a cancellation has no email. The merge
//! keeps every previously known value unless the incoming event supplies a
//! non-empty replacement. `status` is the exception and always comes from the
//! event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error};

use crate::billing::store::{
    StoreError, SubscriptionRecord, SubscriptionStore, SubscriptionUpdate,
};

/// Failures of the read-merge-write cycle
#[derive(Error, Debug)]
pub enum MergeError {
    /// Existing record could not be read
    #[error("Failed to read subscription for user {user_id}: {source}")]
    Read {
        user_id: String,
        #[source]
        source: StoreError,
    },

    /// Merged record could not be written
    #[error("Failed to write subscription for user {user_id}: {source}")]
    Write {
        user_id: String,
        #[source]
        source: StoreError,
    },
}

/// Combine an event's fields with the stored record.
///
/// Pure: no I/O, `now` becomes `updated_at`.
pub fn merge_record(
    user_id: &str,
    existing: Option<&SubscriptionRecord>,
    update: &SubscriptionUpdate,
    now: DateTime<Utc>,
) -> SubscriptionRecord {
    SubscriptionRecord {
        user_id: user_id.to_string(),
        customer_id: pick_text(
            &update.customer_id,
            existing.and_then(|r| r.customer_id.as_ref()),
        ),
        subscription_id: pick_text(
            &update.subscription_id,
            existing.and_then(|r| r.subscription_id.as_ref()),
        ),
        status: update.status,
        price_id: pick_text(&update.price_id, existing.and_then(|r| r.price_id.as_ref())),
        current_period_end: update
            .current_period_end
            .or_else(|| existing.and_then(|r| r.current_period_end)),
        customer_email: pick_text(
            &update.customer_email,
            existing.and_then(|r| r.customer_email.as_ref()),
        ),
        updated_at: now,
    }
}

fn pick_text(incoming: &Option<String>, existing: Option<&String>) -> Option<String> {
    match incoming {
        Some(value) if !value.is_empty() => Some(value.clone()),
        _ => existing.cloned(),
    }
}

/// Reads the stored record, merges the update into it and writes it back
#[derive(Clone)]
pub struct SubscriptionMerger {
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionMerger {
    /// Create a merger over a subscription store
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Merge `update` into the record for `user_id` and persist it.
    ///
    /// A missing record is treated as empty. The read and the write are not
    /// atomic together; the upsert itself is keyed on `user_id`.
    pub async fn upsert(
        &self,
        user_id: &str,
        update: &SubscriptionUpdate,
    ) -> Result<SubscriptionRecord, MergeError> {
        let existing = self
            .store
            .find_by_user(user_id)
            .await
            .map_err(|source| MergeError::Read {
                user_id: user_id.to_string(),
                source,
            })?;

        let merged = merge_record(user_id, existing.as_ref(), update, Utc::now());

        debug!(
            user_id = %user_id,
            had_existing = existing.is_some(),
            status = %merged.status,
            "Writing merged subscription"
        );

        if let Err(source) = self.store.upsert(&merged).await {
            error!(
                user_id = %user_id,
                error = %source,
                "Subscription upsert failed"
            );
            return Err(MergeError::Write {
                user_id: user_id.to_string(),
                source,
            });
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::memory::InMemorySubscriptionStore;
    use crate::billing::store::SubscriptionStatus;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn stored() -> SubscriptionRecord {
        SubscriptionRecord {
            user_id: "u1".to_string(),
            customer_id: Some("cus_1".to_string()),
            subscription_id: Some("sub_1".to_string()),
            status: SubscriptionStatus::Active,
            price_id: Some("p_month".to_string()),
            current_period_end: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            customer_email: Some("a@example.com".to_string()),
            updated_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_merge_into_empty() {
        let now = Utc::now();
        let update = SubscriptionUpdate {
            status: SubscriptionStatus::Active,
            customer_id: Some("cus_9".to_string()),
            subscription_id: Some("sub_9".to_string()),
            price_id: None,
            current_period_end: None,
            customer_email: Some(String::new()),
        };

        let merged = merge_record("u9", None, &update, now);

        assert_eq!(merged.user_id, "u9");
        assert_eq!(merged.customer_id.as_deref(), Some("cus_9"));
        assert_eq!(merged.subscription_id.as_deref(), Some("sub_9"));
        assert_eq!(merged.price_id, None);
        assert_eq!(merged.current_period_end, None);
        assert_eq!(merged.customer_email, None);
        assert_eq!(merged.updated_at, now);
    }

    #[test]
    fn test_merge_keeps_known_fields() {
        let existing = stored();
        let now = Utc::now();
        let update = SubscriptionUpdate::status_only(SubscriptionStatus::PastDue);

        let merged = merge_record("u1", Some(&existing), &update, now);

        assert_eq!(
            merged,
            SubscriptionRecord {
                status: SubscriptionStatus::PastDue,
                updated_at: now,
                ..existing
            }
        );
    }

    #[test]
    fn test_merge_empty_text_does_not_clobber() {
        let existing = stored();
        let update = SubscriptionUpdate {
            price_id: Some(String::new()),
            customer_email: Some(String::new()),
            ..SubscriptionUpdate::status_only(SubscriptionStatus::Active)
        };

        let merged = merge_record("u1", Some(&existing), &update, Utc::now());

        assert_eq!(merged.price_id.as_deref(), Some("p_month"));
        assert_eq!(merged.customer_email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn test_merge_overwrites_with_new_values() {
        let existing = stored();
        let new_end = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let update = SubscriptionUpdate {
            price_id: Some("p_year".to_string()),
            current_period_end: Some(new_end),
            ..SubscriptionUpdate::status_only(SubscriptionStatus::Active)
        };

        let merged = merge_record("u1", Some(&existing), &update, Utc::now());

        assert_eq!(merged.price_id.as_deref(), Some("p_year"));
        assert_eq!(merged.current_period_end, Some(new_end));
        assert_eq!(merged.subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn test_upsert_persists_merged_record() {
        let store = Arc::new(InMemorySubscriptionStore::with_records(vec![stored()]));
        let merger = SubscriptionMerger::new(store.clone());

        let merged = merger
            .upsert(
                "u1",
                &SubscriptionUpdate::status_only(SubscriptionStatus::Canceled),
            )
            .await
            .unwrap();

        assert_eq!(merged.status, SubscriptionStatus::Canceled);
        assert_eq!(store.get("u1").unwrap(), merged);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_upsert_write_failure() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store.fail_writes(true);
        let merger = SubscriptionMerger::new(store.clone());

        let err = merger
            .upsert("u1", &SubscriptionUpdate::status_only(SubscriptionStatus::Active))
            .await
            .unwrap_err();

        assert!(matches!(err, MergeError::Write { .. }));
        assert!(store.get("u1").is_none());
    }

    #[tokio::test]
    async fn test_upsert_read_failure_skips_write() {
        let store = Arc::new(InMemorySubscriptionStore::with_records(vec![stored()]));
        store.fail_reads(true);
        let merger = SubscriptionMerger::new(store.clone());

        let err = merger
            .upsert("u1", &SubscriptionUpdate::status_only(SubscriptionStatus::PastDue))
            .await
            .unwrap_err();

        assert!(matches!(err, MergeError::Read { .. }));
        assert_eq!(store.write_count(), 0);
    }
}
