//! Stripe-Signature verification
//!
//! Header format: `t=<unix timestamp>,v1=<hex hmac>[,v1=<hex hmac>...]`.
//! The signed payload is `"{t}."` followed by the raw request body, keyed with
//! the endpoint secret. Stripe sends several `v1` entries while a secret is
//! being rolled; any one of them matching is enough.

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::stripe::error::{StripeWebhookError, StripeWebhookResult};
use crate::stripe::events::StripeEvent;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Verifies webhook payloads against the endpoint signing secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance: Duration,
}

/// Parsed `Stripe-Signature` header
#[derive(Debug)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    fn parse(header: &str) -> StripeWebhookResult<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    let ts = value.parse::<i64>().map_err(|_| {
                        StripeWebhookError::InvalidSignature("malformed timestamp".into())
                    })?;
                    timestamp = Some(ts);
                }
                // Unparseable entries can never match; skip them
                "v1" => {
                    if let Ok(sig) = hex::decode(value) {
                        signatures.push(sig);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| StripeWebhookError::InvalidSignature("missing timestamp".into()))?;
        if signatures.is_empty() {
            return Err(StripeWebhookError::InvalidSignature(
                "no v1 signature".into(),
            ));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

impl SignatureVerifier {
    /// Create a verifier; a zero tolerance disables the timestamp check
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Verify a payload against its header at the current time
    pub fn verify(&self, payload: &[u8], header: &str) -> StripeWebhookResult<()> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify a payload against its header at a given Unix time
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> StripeWebhookResult<()> {
        let parsed = SignatureHeader::parse(header)?;

        let matched = parsed.signatures.iter().any(|sig| {
            self.mac(parsed.timestamp, payload)
                .map(|mac| mac.verify_slice(sig).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            return Err(StripeWebhookError::InvalidSignature(
                "no signature matches the payload".into(),
            ));
        }

        // Only stale timestamps are rejected; clock skew ahead is tolerated
        if !self.tolerance.is_zero() {
            let tolerance_secs = self.tolerance.as_secs();
            let age = now.saturating_sub(parsed.timestamp);
            if age > i64::try_from(tolerance_secs).unwrap_or(i64::MAX) {
                return Err(StripeWebhookError::TimestampOutOfTolerance {
                    timestamp: parsed.timestamp,
                    tolerance_secs,
                });
            }
        }

        Ok(())
    }

    /// Verify and parse in one step
    pub fn construct_event(&self, payload: &[u8], header: &str) -> StripeWebhookResult<StripeEvent> {
        self.verify(payload, header)?;
        StripeEvent::from_bytes(payload)
    }

    /// Produce a valid header for a payload, as Stripe would
    pub fn sign_header(&self, payload: &[u8], timestamp: i64) -> String {
        let signature = self
            .mac(timestamp, payload)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default();
        format!("t={timestamp},v1={signature}")
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Some(mac)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}
