//! In-memory implementations of the store and provider seams.
//!
//! Used by the test suites and for running the pipeline without Supabase or
//! Stripe credentials.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::billing::store::{
    ProfileStore, StoreError, StoreResult, SubscriptionRecord, SubscriptionStore,
};
use crate::stripe::client::{BillingProvider, CustomerDetails, ProviderError, SubscriptionDetails};

// =============================================================================
// Subscriptions
// =============================================================================

/// Subscription store backed by a `HashMap` keyed on user ID
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    records: Mutex<HashMap<String, SubscriptionRecord>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicU32,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records
    pub fn with_records(records: Vec<SubscriptionRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.lock();
            for record in records {
                map.insert(record.user_id.clone(), record);
            }
        }
        store
    }

    /// Current record for a user
    pub fn get(&self, user_id: &str) -> Option<SubscriptionRecord> {
        self.records.lock().get(user_id).cloned()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful upserts
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every read fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every upsert fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn find_by_user(&self, user_id: &str) -> StoreResult<Option<SubscriptionRecord>> {
        self.check_reads()?;
        Ok(self.get(user_id))
    }

    async fn find_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        self.check_reads()?;
        Ok(self
            .records
            .lock()
            .values()
            .find(|r| r.subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn upsert(&self, record: &SubscriptionRecord) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated write failure".to_string()));
        }
        self.records
            .lock()
            .insert(record.user_id.clone(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Profiles
// =============================================================================

#[derive(Debug, Clone)]
struct Profile {
    email: String,
    is_premium: bool,
}

/// Profile store backed by a `HashMap` keyed on user ID
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: Mutex<HashMap<String, Profile>>,
    premium_calls: Mutex<Vec<(String, bool)>>,
    lookups: AtomicU32,
    fail_lookups: AtomicBool,
    fail_updates: AtomicBool,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding a single non-premium profile
    pub fn with_profile(user_id: &str, email: &str) -> Self {
        let store = Self::new();
        store.add_profile(user_id, email);
        store
    }

    /// Add a non-premium profile
    pub fn add_profile(&self, user_id: &str, email: &str) {
        self.profiles.lock().insert(
            user_id.to_string(),
            Profile {
                email: email.to_string(),
                is_premium: false,
            },
        );
    }

    /// Current premium flag, `None` when there is no such profile
    pub fn is_premium(&self, user_id: &str) -> Option<bool> {
        self.profiles.lock().get(user_id).map(|p| p.is_premium)
    }

    /// Every `set_premium` call received, including failed ones
    pub fn premium_calls(&self) -> Vec<(String, bool)> {
        self.premium_calls.lock().clone()
    }

    /// Number of email lookups performed
    pub fn lookup_count(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated lookup failure".to_string()));
        }
        Ok(self
            .profiles
            .lock()
            .iter()
            .find(|(_, p)| p.email == email)
            .map(|(id, _)| id.clone()))
    }

    async fn set_premium(&self, user_id: &str, is_premium: bool) -> StoreResult<()> {
        self.premium_calls
            .lock()
            .push((user_id.to_string(), is_premium));
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated update failure".to_string()));
        }
        // PATCH semantics: updating a missing row is not an error
        if let Some(profile) = self.profiles.lock().get_mut(user_id) {
            profile.is_premium = is_premium;
        }
        Ok(())
    }
}

// =============================================================================
// Provider
// =============================================================================

/// Billing provider answering from fixed tables
#[derive(Debug, Default)]
pub struct StaticBillingProvider {
    subscriptions: HashMap<String, SubscriptionDetails>,
    customers: HashMap<String, CustomerDetails>,
    fail: AtomicBool,
    calls: AtomicU32,
}

impl StaticBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(mut self, id: &str, details: SubscriptionDetails) -> Self {
        self.subscriptions.insert(id.to_string(), details);
        self
    }

    pub fn with_customer(mut self, id: &str, email: &str) -> Self {
        self.customers.insert(
            id.to_string(),
            CustomerDetails {
                email: Some(email.to_string()),
            },
        );
        self
    }

    /// Make every call fail
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of calls received
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 503,
                message: "simulated provider outage".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BillingProvider for StaticBillingProvider {
    async fn retrieve_subscription(&self, id: &str) -> Result<SubscriptionDetails, ProviderError> {
        self.check()?;
        self.subscriptions
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::Api {
                status: 404,
                message: format!("No such subscription: '{id}'"),
            })
    }

    async fn retrieve_customer(&self, id: &str) -> Result<CustomerDetails, ProviderError> {
        self.check()?;
        self.customers
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::Api {
                status: 404,
                message: format!("No such customer: '{id}'"),
            })
    }
}
