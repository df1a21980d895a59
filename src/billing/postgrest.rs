//! Supabase (PostgREST) backed stores.
//!
//! - `SUPABASE_URL` (required): project URL, e.g. `https://xyz.supabase.co`
//! - `SUPABASE_SERVICE_ROLE_KEY` (required): service role key, bypasses RLS
//!
//! Tables used: `subscriptions` (unique on `user_id`) and `profiles`
//! (`id`, `email`, `is_premium`).

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::error;
use url::Url;

use crate::billing::store::{
    ProfileStore, StoreError, StoreResult, SubscriptionRecord, SubscriptionStore,
};
use crate::config::{required_var, ConfigError, ConfigResult};

const SUBSCRIPTIONS_TABLE: &str = "subscriptions";
const PROFILES_TABLE: &str = "profiles";

/// Connection settings for the Supabase REST API
#[derive(Clone)]
pub struct PostgrestConfig {
    pub url: Url,
    /// Service role key; never logged
    pub service_role_key: String,
}

impl std::fmt::Debug for PostgrestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestConfig")
            .field("url", &self.url.as_str())
            .field("service_role_key", &"<redacted>")
            .finish()
    }
}

impl PostgrestConfig {
    /// Load from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let url = required_var("SUPABASE_URL")?;
        let url = Url::parse(&url).map_err(|e| ConfigError::Invalid {
            name: "SUPABASE_URL",
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                name: "SUPABASE_URL",
                reason: "not an http(s) base URL".to_string(),
            });
        }

        Ok(Self {
            url,
            service_role_key: required_var("SUPABASE_SERVICE_ROLE_KEY")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProfileId {
    id: String,
}

#[derive(Debug, Serialize)]
struct PremiumPatch {
    is_premium: bool,
}

/// Subscription and profile store over PostgREST
#[derive(Clone)]
pub struct PostgrestStore {
    http: reqwest::Client,
    rest_base: Url,
}

impl PostgrestStore {
    /// Create a store with the service role key on every request
    pub fn new(config: &PostgrestConfig, timeout: Duration) -> StoreResult<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.service_role_key)
            .map_err(|e| StoreError::Backend(format!("invalid service role key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_role_key))
            .map_err(|e| StoreError::Backend(format!("invalid service role key: {e}")))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            rest_base: rest_base(&config.url)?,
        })
    }

    fn table(&self, table: &str) -> StoreResult<Url> {
        Ok(self.rest_base.join(table)?)
    }

    fn request(&self, method: Method, table: &str) -> StoreResult<RequestBuilder> {
        Ok(self.http.request(method, self.table(table)?))
    }

    async fn send(request: RequestBuilder, context: &str) -> StoreResult<reqwest::Response> {
        let resp = request.send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = resp
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));

        error!(status = %status, context = %context, body = %body, "store request failed");

        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn select_one(&self, column: &str, value: &str) -> StoreResult<Option<SubscriptionRecord>> {
        let filter = format!("eq.{value}");
        let request = self
            .request(Method::GET, SUBSCRIPTIONS_TABLE)?
            .query(&[(column, filter.as_str()), ("select", "*"), ("limit", "1")]);

        let resp = Self::send(request, "select subscription").await?;
        let rows: Vec<SubscriptionRecord> = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(rows.into_iter().next())
    }
}

/// `{project}/rest/v1/`, with the trailing slash so `join` appends
fn rest_base(project: &Url) -> StoreResult<Url> {
    let mut base = project.clone();
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    Ok(base.join("rest/v1/")?)
}

#[async_trait::async_trait]
impl SubscriptionStore for PostgrestStore {
    async fn find_by_user(&self, user_id: &str) -> StoreResult<Option<SubscriptionRecord>> {
        self.select_one("user_id", user_id).await
    }

    async fn find_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        self.select_one("stripe_subscription_id", subscription_id).await
    }

    async fn upsert(&self, record: &SubscriptionRecord) -> StoreResult<()> {
        let request = self
            .request(Method::POST, SUBSCRIPTIONS_TABLE)?
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[record]);

        Self::send(request, "upsert subscription").await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProfileStore for PostgrestStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<String>> {
        let filter = format!("eq.{email}");
        let request = self.request(Method::GET, PROFILES_TABLE)?.query(&[
            ("email", filter.as_str()),
            ("select", "id"),
            ("limit", "1"),
        ]);

        let resp = Self::send(request, "lookup profile by email").await?;
        let rows: Vec<ProfileId> = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(rows.into_iter().next().map(|row| row.id))
    }

    async fn set_premium(&self, user_id: &str, is_premium: bool) -> StoreResult<()> {
        let filter = format!("eq.{user_id}");
        let request = self
            .request(Method::PATCH, PROFILES_TABLE)?
            .query(&[("id", filter.as_str())])
            .header("Prefer", "return=minimal")
            .json(&PremiumPatch { is_premium });

        Self::send(request, "update premium flag").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> PostgrestConfig {
        PostgrestConfig {
            url: Url::parse(url).unwrap(),
            service_role_key: "service-role-key".to_string(),
        }
    }

    #[test]
    fn test_table_urls() {
        let store = PostgrestStore::new(&config("https://xyz.supabase.co"), Duration::from_secs(5))
            .unwrap();
        assert_eq!(
            store.table(SUBSCRIPTIONS_TABLE).unwrap().as_str(),
            "https://xyz.supabase.co/rest/v1/subscriptions"
        );
    }

    #[test]
    fn test_rest_base_keeps_path_prefix() {
        let base = rest_base(&Url::parse("http://localhost:54321/project").unwrap()).unwrap();
        assert_eq!(base.as_str(), "http://localhost:54321/project/rest/v1/");

        let base = rest_base(&Url::parse("http://localhost:54321/").unwrap()).unwrap();
        assert_eq!(base.as_str(), "http://localhost:54321/rest/v1/");
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", config("https://xyz.supabase.co"));
        assert!(!debug.contains("service-role-key"));
    }

    #[test]
    fn test_invalid_key_rejected() {
        let mut bad = config("https://xyz.supabase.co");
        bad.service_role_key = "line\nbreak".to_string();
        assert!(PostgrestStore::new(&bad, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_premium_patch_body() {
        let body = serde_json::to_value(PremiumPatch { is_premium: true }).unwrap();
        assert_eq!(body, serde_json::json!({"is_premium": true}));
    }
}
