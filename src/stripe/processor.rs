//! Event dispatch
//!
//! Routes a verified event to exactly one handler method by type tag and
//! bounds the whole handling by the processing timeout. Processing is
//! synchronous with the request: the response code Stripe receives reflects
//! whether the event was durably recorded, and redelivery is Stripe's job.
//!
//! ```text
//! StripeEvent
//!      |
//!      v
//! [Decode typed object] --> malformed --> InvalidPayload (400)
//!      |
//!      v
//! [Dispatch under timeout] --> timeout --> Timeout (500)
//!      |
//!      v
//! EventOutcome (200) | StripeWebhookError (400/500)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;

use crate::billing::store::SubscriptionStatus;
use crate::stripe::error::{StripeWebhookError, StripeWebhookResult};
use crate::stripe::events::{CheckoutSession, Invoice, StripeEvent, Subscription, WebhookEvent};

/// What happened to an event that was consumed successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// The subscription record was written
    Applied {
        user_id: String,
        status: SubscriptionStatus,
    },
    /// Nothing to do for this event
    Skipped { reason: String },
    /// Event type this service does not handle
    Unhandled { event_type: String },
}

impl EventOutcome {
    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Skipped { .. } => "skipped",
            Self::Unhandled { .. } => "unhandled",
        }
    }

    pub(crate) fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// Handler trait for subscription events
#[async_trait::async_trait]
pub trait SubscriptionHandler: Send + Sync + 'static {
    /// Handle a completed checkout session
    async fn on_checkout_completed(
        &self,
        event_id: &str,
        session: &CheckoutSession,
    ) -> StripeWebhookResult<EventOutcome>;

    /// Handle a paid invoice
    async fn on_invoice_paid(
        &self,
        event_id: &str,
        invoice: &Invoice,
    ) -> StripeWebhookResult<EventOutcome>;

    /// Handle a failed invoice payment
    async fn on_invoice_payment_failed(
        &self,
        event_id: &str,
        invoice: &Invoice,
    ) -> StripeWebhookResult<EventOutcome>;

    /// Handle a deleted (ended) subscription
    async fn on_subscription_deleted(
        &self,
        event_id: &str,
        subscription: &Subscription,
    ) -> StripeWebhookResult<EventOutcome>;
}

/// Dispatches verified events to a [`SubscriptionHandler`]
pub struct EventProcessor<H: SubscriptionHandler> {
    handler: Arc<H>,
    processing_timeout: Duration,
}

impl<H: SubscriptionHandler> Clone for EventProcessor<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            processing_timeout: self.processing_timeout,
        }
    }
}

impl<H: SubscriptionHandler> EventProcessor<H> {
    /// Create a new event processor
    pub fn new(handler: Arc<H>, processing_timeout: Duration) -> Self {
        Self {
            handler,
            processing_timeout,
        }
    }

    /// Process one event to completion
    pub async fn process(&self, event: &StripeEvent) -> StripeWebhookResult<EventOutcome> {
        let webhook_event = event.to_webhook_event()?;

        let outcome = timeout(self.processing_timeout, self.dispatch(&event.id, &webhook_event))
            .await
            .map_err(|_| StripeWebhookError::Timeout(self.processing_timeout))??;

        match &outcome {
            EventOutcome::Applied { user_id, status } => tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                user_id = %user_id,
                status = %status,
                "Event applied"
            ),
            EventOutcome::Skipped { reason } => tracing::debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                reason = %reason,
                "Event skipped"
            ),
            EventOutcome::Unhandled { .. } => tracing::debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Ignoring unhandled event type"
            ),
        }

        Ok(outcome)
    }

    async fn dispatch(
        &self,
        event_id: &str,
        event: &WebhookEvent,
    ) -> StripeWebhookResult<EventOutcome> {
        match event {
            WebhookEvent::CheckoutCompleted(session) => {
                self.handler.on_checkout_completed(event_id, session).await
            }
            WebhookEvent::InvoicePaid(invoice) => {
                self.handler.on_invoice_paid(event_id, invoice).await
            }
            WebhookEvent::InvoicePaymentFailed(invoice) => {
                self.handler.on_invoice_payment_failed(event_id, invoice).await
            }
            WebhookEvent::SubscriptionDeleted(subscription) => {
                self.handler
                    .on_subscription_deleted(event_id, subscription)
                    .await
            }
            WebhookEvent::Unhandled(event_type) => Ok(EventOutcome::Unhandled {
                event_type: event_type.clone(),
            }),
        }
    }
}
