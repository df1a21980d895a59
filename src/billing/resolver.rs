//! Event-to-user resolution.
//!
//! Three strategies, tried in order, first match wins:
//!
//! 1. a direct user reference (`client_reference_id` on checkout sessions)
//! 2. the `user_id` entry of the object's metadata
//! 3. an exact email lookup in the profile store
//!
//! The email path is what links a payment made before signup to the account
//! created afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::billing::store::{ProfileStore, StoreError};

/// Metadata key carrying our user ID on Stripe objects
pub const USER_ID_METADATA_KEY: &str = "user_id";

/// Which strategy produced the user ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionSource {
    Direct,
    Metadata,
    Email,
}

impl ResolutionSource {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Metadata => "metadata",
            Self::Email => "email",
        }
    }
}

/// A successfully resolved user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
    pub user_id: String,
    pub source: ResolutionSource,
}

/// Why no user could be resolved
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// No direct or metadata ID, and no email to look up
    #[error("No user reference and no email to look up")]
    NoEmail,

    /// The profile store failed during the email lookup
    #[error("Profile lookup for {email} failed: {source}")]
    LookupFailed {
        email: String,
        #[source]
        source: StoreError,
    },

    /// The lookup succeeded but matched no profile
    #[error("No profile found for {email}")]
    ProfileNotFound { email: String },
}

impl ResolutionError {
    /// Machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoEmail => "no_email",
            Self::LookupFailed { .. } => "lookup_failed",
            Self::ProfileNotFound { .. } => "profile_not_found",
        }
    }
}

/// Resolves identity hints to an internal user ID
#[derive(Clone)]
pub struct UserResolver {
    profiles: Arc<dyn ProfileStore>,
}

impl UserResolver {
    /// Create a resolver backed by a profile store
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    /// Resolve a user from the hints an event carries.
    ///
    /// Empty strings count as absent.
    pub async fn resolve(
        &self,
        direct_id: Option<&str>,
        metadata: Option<&HashMap<String, String>>,
        email: Option<&str>,
    ) -> Result<ResolvedUser, ResolutionError> {
        if let Some(user_id) = non_empty(direct_id) {
            return Ok(ResolvedUser {
                user_id: user_id.to_string(),
                source: ResolutionSource::Direct,
            });
        }

        let from_metadata = metadata
            .and_then(|m| m.get(USER_ID_METADATA_KEY))
            .map(String::as_str);
        if let Some(user_id) = non_empty(from_metadata) {
            return Ok(ResolvedUser {
                user_id: user_id.to_string(),
                source: ResolutionSource::Metadata,
            });
        }

        let email = non_empty(email).ok_or(ResolutionError::NoEmail)?;

        match self.profiles.find_by_email(email).await {
            Ok(Some(user_id)) => Ok(ResolvedUser {
                user_id,
                source: ResolutionSource::Email,
            }),
            Ok(None) => Err(ResolutionError::ProfileNotFound {
                email: email.to_string(),
            }),
            Err(source) => Err(ResolutionError::LookupFailed {
                email: email.to_string(),
                source,
            }),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
