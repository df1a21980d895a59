//! Webhook event handling: resolve the user, enrich from Stripe, merge the
//! record, then sync the premium flag.
//!
//! | Event                           | Status     | Premium |
//! |---------------------------------|------------|---------|
//! | `checkout.session.completed`    | `active`   | true    |
//! | `invoice.paid`                  | `active`   | true    |
//! | `invoice.payment_failed`        | `past_due` | false   |
//! | `customer.subscription.deleted` | `canceled` | false   |

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::billing::merge::SubscriptionMerger;
use crate::billing::premium::PremiumSync;
use crate::billing::resolver::{ResolvedUser, UserResolver};
use crate::billing::store::{
    ProfileStore, SubscriptionStatus, SubscriptionStore, SubscriptionUpdate,
};
use crate::metrics::global_metrics;
use crate::stripe::client::{BillingProvider, SubscriptionDetails};
use crate::stripe::error::StripeWebhookResult;
use crate::stripe::events::{CheckoutSession, Invoice, Subscription};
use crate::stripe::processor::{EventOutcome, SubscriptionHandler};

/// Identity hints carried by one event
struct IdentityHints<'a> {
    event_id: &'a str,
    event_type: &'a str,
    direct_id: Option<&'a str>,
    metadata: Option<&'a HashMap<String, String>>,
    email: Option<&'a str>,
    customer_id: Option<&'a str>,
}

/// Reconciles Stripe events into subscription records
pub struct Reconciler {
    resolver: UserResolver,
    merger: SubscriptionMerger,
    premium: PremiumSync,
    subscriptions: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn BillingProvider>,
}

impl Reconciler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        profiles: Arc<dyn ProfileStore>,
        provider: Arc<dyn BillingProvider>,
    ) -> Self {
        Self {
            resolver: UserResolver::new(profiles.clone()),
            merger: SubscriptionMerger::new(subscriptions.clone()),
            premium: PremiumSync::new(profiles),
            subscriptions,
            provider,
        }
    }

    async fn resolve(&self, hints: IdentityHints<'_>) -> StripeWebhookResult<ResolvedUser> {
        match self
            .resolver
            .resolve(hints.direct_id, hints.metadata, hints.email)
            .await
        {
            Ok(resolved) => {
                global_metrics().record_resolution(resolved.source);
                Ok(resolved)
            }
            Err(e) => {
                // Needs manual reconciliation if Stripe gives up redelivering
                error!(
                    event_id = %hints.event_id,
                    event_type = %hints.event_type,
                    email = ?hints.email,
                    customer_id = ?hints.customer_id,
                    reason = e.reason(),
                    error = %e,
                    "Could not resolve user for event"
                );
                Err(e.into())
            }
        }
    }

    /// Price and period end of a subscription; empty on any failure
    async fn subscription_details(
        &self,
        event_id: &str,
        subscription_id: Option<&str>,
    ) -> SubscriptionDetails {
        let Some(subscription_id) = subscription_id else {
            return SubscriptionDetails::default();
        };

        match self.provider.retrieve_subscription(subscription_id).await {
            Ok(details) => details,
            Err(e) => {
                warn!(
                    event_id = %event_id,
                    subscription_id = %subscription_id,
                    error = %e,
                    "Could not retrieve subscription, continuing without price and period end"
                );
                SubscriptionDetails::default()
            }
        }
    }

    /// Invoice email, falling back to the Stripe customer's
    async fn invoice_email(&self, event_id: &str, invoice: &Invoice) -> Option<String> {
        if let Some(email) = invoice.email() {
            return Some(email.to_string());
        }
        let customer_id = invoice.customer_id()?;

        match self.provider.retrieve_customer(customer_id).await {
            Ok(customer) => customer.email,
            Err(e) => {
                warn!(
                    event_id = %event_id,
                    customer_id = %customer_id,
                    error = %e,
                    "Could not retrieve customer email"
                );
                None
            }
        }
    }

    async fn resolve_invoice(
        &self,
        event_id: &str,
        event_type: &str,
        invoice: &Invoice,
    ) -> StripeWebhookResult<(ResolvedUser, Option<String>)> {
        let email = self.invoice_email(event_id, invoice).await;
        let resolved = self
            .resolve(IdentityHints {
                event_id,
                event_type,
                direct_id: None,
                metadata: invoice.subscription_metadata(),
                email: email.as_deref(),
                customer_id: invoice.customer_id(),
            })
            .await?;
        Ok((resolved, email))
    }

    /// Write the record, then the premium flag
    async fn apply(
        &self,
        user_id: &str,
        update: SubscriptionUpdate,
    ) -> StripeWebhookResult<EventOutcome> {
        let record = self.merger.upsert(user_id, &update).await?;
        self.premium
            .set_premium(Some(user_id), record.status.is_premium())
            .await;

        Ok(EventOutcome::Applied {
            user_id: record.user_id,
            status: record.status,
        })
    }
}

/// Subscription an invoice bills for; one-off invoices have none and leave
/// the record untouched.
fn invoice_subscription<'a>(event_id: &str, invoice: &'a Invoice) -> Option<&'a str> {
    let subscription_id = invoice.subscription.as_deref().filter(|id| !id.is_empty());
    if subscription_id.is_none() {
        debug!(
            event_id = %event_id,
            invoice_id = %invoice.id,
            billing_reason = ?invoice.billing_reason,
            "Invoice without a subscription, skipping"
        );
    }
    subscription_id
}

#[async_trait::async_trait]
impl SubscriptionHandler for Reconciler {
    async fn on_checkout_completed(
        &self,
        event_id: &str,
        session: &CheckoutSession,
    ) -> StripeWebhookResult<EventOutcome> {
        let Some(subscription_id) = session.subscription.as_deref() else {
            warn!(
                event_id = %event_id,
                session_id = %session.id,
                mode = ?session.mode,
                "Checkout completed without a subscription, skipping"
            );
            return Ok(EventOutcome::skipped("no_subscription"));
        };

        let resolved = self
            .resolve(IdentityHints {
                event_id,
                event_type: "checkout.session.completed",
                direct_id: session.client_reference_id.as_deref(),
                metadata: session.metadata.as_ref(),
                email: session.email(),
                customer_id: session.customer_id(),
            })
            .await?;

        let details = self
            .subscription_details(event_id, Some(subscription_id))
            .await;

        info!(
            event_id = %event_id,
            user_id = %resolved.user_id,
            source = resolved.source.as_str(),
            subscription_id = %subscription_id,
            "Activating subscription from checkout"
        );

        self.apply(
            &resolved.user_id,
            SubscriptionUpdate {
                status: SubscriptionStatus::Active,
                customer_id: session.customer_id().map(str::to_string),
                subscription_id: Some(subscription_id.to_string()),
                price_id: details.price_id,
                current_period_end: details.current_period_end,
                customer_email: session.email().map(str::to_string),
            },
        )
        .await
    }

    async fn on_invoice_paid(
        &self,
        event_id: &str,
        invoice: &Invoice,
    ) -> StripeWebhookResult<EventOutcome> {
        let Some(subscription_id) = invoice_subscription(event_id, invoice) else {
            return Ok(EventOutcome::skipped("no_subscription"));
        };

        let (resolved, email) = self
            .resolve_invoice(event_id, "invoice.paid", invoice)
            .await?;
        let details = self
            .subscription_details(event_id, Some(subscription_id))
            .await;

        info!(
            event_id = %event_id,
            invoice_id = %invoice.id,
            user_id = %resolved.user_id,
            source = resolved.source.as_str(),
            billing_reason = ?invoice.billing_reason,
            "Invoice paid"
        );

        self.apply(
            &resolved.user_id,
            SubscriptionUpdate {
                status: SubscriptionStatus::Active,
                customer_id: invoice.customer_id().map(str::to_string),
                subscription_id: Some(subscription_id.to_string()),
                price_id: details.price_id,
                current_period_end: details.current_period_end,
                customer_email: email,
            },
        )
        .await
    }

    async fn on_invoice_payment_failed(
        &self,
        event_id: &str,
        invoice: &Invoice,
    ) -> StripeWebhookResult<EventOutcome> {
        let Some(subscription_id) = invoice_subscription(event_id, invoice) else {
            return Ok(EventOutcome::skipped("no_subscription"));
        };

        let (resolved, email) = self
            .resolve_invoice(event_id, "invoice.payment_failed", invoice)
            .await?;

        warn!(
            event_id = %event_id,
            invoice_id = %invoice.id,
            user_id = %resolved.user_id,
            "Invoice payment failed, marking subscription past due"
        );

        self.apply(
            &resolved.user_id,
            SubscriptionUpdate {
                customer_id: invoice.customer_id().map(str::to_string),
                subscription_id: Some(subscription_id.to_string()),
                customer_email: email,
                ..SubscriptionUpdate::status_only(SubscriptionStatus::PastDue)
            },
        )
        .await
    }

    async fn on_subscription_deleted(
        &self,
        event_id: &str,
        subscription: &Subscription,
    ) -> StripeWebhookResult<EventOutcome> {
        let Some(existing) = self
            .subscriptions
            .find_by_subscription(&subscription.id)
            .await?
        else {
            warn!(
                event_id = %event_id,
                subscription_id = %subscription.id,
                "No stored record for deleted subscription, skipping"
            );
            return Ok(EventOutcome::skipped("unknown_subscription"));
        };

        info!(
            event_id = %event_id,
            subscription_id = %subscription.id,
            user_id = %existing.user_id,
            "Canceling subscription"
        );

        self.apply(
            &existing.user_id,
            SubscriptionUpdate {
                customer_id: subscription.customer_id().map(str::to_string),
                subscription_id: Some(subscription.id.clone()),
                ..SubscriptionUpdate::status_only(SubscriptionStatus::Canceled)
            },
        )
        .await
    }
}
