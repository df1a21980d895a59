//! Axum webhook endpoint
//!
//! The body is taken as raw [`Bytes`] so the signature is checked against
//! exactly what Stripe signed; any JSON extractor in front of it would break
//! verification.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, warn};

use crate::metrics::global_metrics;
use crate::stripe::config::StripeWebhookConfig;
use crate::stripe::error::{StripeWebhookError, StripeWebhookResult};
use crate::stripe::processor::{EventOutcome, EventProcessor, SubscriptionHandler};
use crate::stripe::signature::{SignatureVerifier, SIGNATURE_HEADER};

/// Path Stripe delivers to
pub const WEBHOOK_PATH: &str = "/webhooks/stripe";

/// Shared state of the webhook route
pub struct StripeWebhookState<H: SubscriptionHandler> {
    verifier: SignatureVerifier,
    processor: EventProcessor<H>,
}

impl<H: SubscriptionHandler> StripeWebhookState<H> {
    pub fn new(config: &StripeWebhookConfig, handler: Arc<H>) -> Self {
        Self {
            verifier: SignatureVerifier::new(
                config.webhook_secret.clone(),
                config.signature_tolerance,
            ),
            processor: EventProcessor::new(handler, config.processing_timeout),
        }
    }

    /// Verify, parse and process one delivery
    async fn receive(&self, headers: &HeaderMap, body: &[u8]) -> StripeWebhookResult<EventOutcome> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(StripeWebhookError::MissingSignature)?;

        let event = self.verifier.construct_event(body, signature)?;
        global_metrics().record_event(&event.event_type);

        self.processor.process(&event).await.inspect_err(|e| {
            error!(
                event_id = %event.id,
                event_type = %event.event_type,
                reason = e.reason(),
                retryable = e.is_retryable(),
                error = %e,
                "Event processing failed"
            );
        })
    }
}

/// 200 body
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: EventOutcome,
}

/// `POST /webhooks/stripe`
pub async fn stripe_webhook_handler<H: SubscriptionHandler>(
    State(state): State<Arc<StripeWebhookState<H>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();

    let response = match state.receive(&headers, &body).await {
        Ok(outcome) => {
            global_metrics().record_outcome(&outcome);
            (
                StatusCode::OK,
                Json(WebhookAck {
                    received: true,
                    outcome,
                }),
            )
                .into_response()
        }
        Err(e) => {
            if !e.is_retryable() {
                warn!(reason = e.reason(), error = %e, "Rejected webhook request");
            }
            global_metrics().record_failure(e.reason());
            e.into_response()
        }
    };

    global_metrics().record_response(response.status().as_u16(), started.elapsed());
    response
}

/// Router with the webhook route; other methods get 405
pub fn stripe_webhook_router<H: SubscriptionHandler>(state: Arc<StripeWebhookState<H>>) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(stripe_webhook_handler::<H>))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::store::SubscriptionStatus;
    use crate::stripe::events::{CheckoutSession, Invoice, Subscription};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct AlwaysApplied;

    #[async_trait::async_trait]
    impl SubscriptionHandler for AlwaysApplied {
        async fn on_checkout_completed(
            &self,
            _event_id: &str,
            _session: &CheckoutSession,
        ) -> StripeWebhookResult<EventOutcome> {
            Ok(EventOutcome::Applied {
                user_id: "u1".into(),
                status: SubscriptionStatus::Active,
            })
        }
        async fn on_invoice_paid(
            &self,
            _event_id: &str,
            _invoice: &Invoice,
        ) -> StripeWebhookResult<EventOutcome> {
            Ok(EventOutcome::skipped("test"))
        }
        async fn on_invoice_payment_failed(
            &self,
            _event_id: &str,
            _invoice: &Invoice,
        ) -> StripeWebhookResult<EventOutcome> {
            Ok(EventOutcome::skipped("test"))
        }
        async fn on_subscription_deleted(
            &self,
            _event_id: &str,
            _subscription: &Subscription,
        ) -> StripeWebhookResult<EventOutcome> {
            Ok(EventOutcome::skipped("test"))
        }
    }

    fn router() -> Router {
        let config = StripeWebhookConfig::test_config();
        stripe_webhook_router(Arc::new(StripeWebhookState::new(
            &config,
            Arc::new(AlwaysApplied),
        )))
    }

    fn signed(body: &str) -> String {
        let config = StripeWebhookConfig::test_config();
        SignatureVerifier::new(config.webhook_secret, config.signature_tolerance)
            .sign_header(body.as_bytes(), chrono::Utc::now().timestamp())
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_signed_event_acknowledged() {
        let body = r#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;
        let response = router()
            .oneshot(
                Request::post(WEBHOOK_PATH)
                    .header(SIGNATURE_HEADER, signed(body))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"received": true, "outcome": "applied", "user_id": "u1", "status": "active"})
        );
    }

    #[tokio::test]
    async fn test_missing_signature() {
        let response = router()
            .oneshot(
                Request::post(WEBHOOK_PATH)
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "missing_signature");
        assert_eq!(json["retryable"], false);
    }

    #[tokio::test]
    async fn test_get_not_allowed() {
        let response = router()
            .oneshot(Request::get(WEBHOOK_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
