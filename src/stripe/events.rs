//! Stripe Event Types
//!
//! Strongly-typed representations of the webhook events that drive
//! subscription reconciliation. Anything else Stripe sends is kept as
//! [`WebhookEvent::Unhandled`] with only its type tag.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::stripe::error::{StripeWebhookError, StripeWebhookResult};
use crate::stripe::extract::extract_subscription_id;

/// Stripe event types we handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StripeEventType {
    #[serde(rename = "checkout.session.completed")]
    CheckoutSessionCompleted,
    #[serde(rename = "invoice.paid")]
    InvoicePaid,
    #[serde(rename = "invoice.payment_failed")]
    InvoicePaymentFailed,
    #[serde(rename = "customer.subscription.deleted")]
    SubscriptionDeleted,

    // Catch-all for events we don't explicitly handle
    #[serde(other)]
    Unknown,
}

impl StripeEventType {
    /// Parse a type tag; unknown tags map to `Unknown`
    pub fn parse(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "invoice.paid" => Self::InvoicePaid,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            _ => Self::Unknown,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::Unknown => "unknown",
        }
    }

    /// Check if this is a known event type
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl FromStr for StripeEventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Generic Stripe event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    /// Unique identifier for the event
    pub id: String,

    /// Type of event
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time of event creation (Unix timestamp)
    #[serde(default)]
    pub created: i64,

    /// API version used to render data
    #[serde(default)]
    pub api_version: Option<String>,

    /// Whether this is a live mode event
    #[serde(default)]
    pub livemode: bool,

    /// Object containing event data
    pub data: EventData,
}

/// Event data container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    /// The event's object (checkout session, invoice, subscription, ...)
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Parse from raw JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> StripeWebhookResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| StripeWebhookError::InvalidPayload(e.to_string()))
    }

    /// Get the typed event type
    pub fn typed_event_type(&self) -> StripeEventType {
        StripeEventType::parse(&self.event_type)
    }

    /// Decode the event object into its typed variant
    pub fn to_webhook_event(&self) -> StripeWebhookResult<WebhookEvent> {
        let object = &self.data.object;
        Ok(match self.typed_event_type() {
            StripeEventType::CheckoutSessionCompleted => {
                let mut session: CheckoutSession = self.decode_object()?;
                session.subscription = extract_subscription_id(object);
                WebhookEvent::CheckoutCompleted(session)
            }
            StripeEventType::InvoicePaid => {
                let mut invoice: Invoice = self.decode_object()?;
                invoice.subscription = extract_subscription_id(object);
                WebhookEvent::InvoicePaid(invoice)
            }
            StripeEventType::InvoicePaymentFailed => {
                let mut invoice: Invoice = self.decode_object()?;
                invoice.subscription = extract_subscription_id(object);
                WebhookEvent::InvoicePaymentFailed(invoice)
            }
            StripeEventType::SubscriptionDeleted => {
                WebhookEvent::SubscriptionDeleted(self.decode_object()?)
            }
            StripeEventType::Unknown => WebhookEvent::Unhandled(self.event_type.clone()),
        })
    }

    fn decode_object<T: serde::de::DeserializeOwned>(&self) -> StripeWebhookResult<T> {
        T::deserialize(&self.data.object).map_err(|e| {
            StripeWebhookError::InvalidPayload(format!("{} object: {}", self.event_type, e))
        })
    }
}

/// The closed set of events the router dispatches on
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    CheckoutCompleted(CheckoutSession),
    InvoicePaid(Invoice),
    InvoicePaymentFailed(Invoice),
    SubscriptionDeleted(Subscription),
    /// Any other event type, by tag
    Unhandled(String),
}

impl WebhookEvent {
    /// Stripe type tag of the event
    pub fn event_type(&self) -> &str {
        match self {
            Self::CheckoutCompleted(_) => StripeEventType::CheckoutSessionCompleted.as_str(),
            Self::InvoicePaid(_) => StripeEventType::InvoicePaid.as_str(),
            Self::InvoicePaymentFailed(_) => StripeEventType::InvoicePaymentFailed.as_str(),
            Self::SubscriptionDeleted(_) => StripeEventType::SubscriptionDeleted.as_str(),
            Self::Unhandled(tag) => tag,
        }
    }
}

/// A reference that Stripe sends either as an ID or as the expanded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectRef {
    Id(String),
    Expanded { id: String },
}

impl ObjectRef {
    /// The referenced object's ID
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Expanded { id } => id,
        }
    }
}

// =============================================================================
// Checkout Types
// =============================================================================

/// Stripe checkout session object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Session ID (cs_...)
    pub id: String,
    /// Our user ID, set when the user was signed in at checkout
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub customer: Option<ObjectRef>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerContact>,
    /// Checkout mode (payment, setup, subscription)
    #[serde(default)]
    pub mode: Option<String>,
    /// Subscription created by the session, located by the extractor
    #[serde(skip)]
    pub subscription: Option<String>,
}

impl CheckoutSession {
    /// Email entered at checkout
    pub fn email(&self) -> Option<&str> {
        non_empty(self.customer_email.as_deref()).or_else(|| {
            self.customer_details
                .as_ref()
                .and_then(|d| non_empty(d.email.as_deref()))
        })
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(ObjectRef::id)
    }
}

/// Customer details collected during checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerContact {
    #[serde(default)]
    pub email: Option<String>,
}

// =============================================================================
// Invoice Types
// =============================================================================

/// Stripe invoice object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice ID (in_...)
    pub id: String,
    #[serde(default)]
    pub customer: Option<ObjectRef>,
    /// Customer email at time of invoice
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub billing_reason: Option<String>,
    /// Subscription details on older API versions
    #[serde(default)]
    pub subscription_details: Option<InvoiceSubscriptionDetails>,
    /// Invoice parent on newer API versions
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
    /// Subscription billed by the invoice, located by the extractor
    #[serde(skip)]
    pub subscription: Option<String>,
}

/// Parent of an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<InvoiceSubscriptionDetails>,
}

/// Subscription snapshot attached to an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSubscriptionDetails {
    /// Subscription metadata at the time the invoice was finalized
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl Invoice {
    pub fn email(&self) -> Option<&str> {
        non_empty(self.customer_email.as_deref())
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(ObjectRef::id)
    }

    /// Metadata of the billed subscription, wherever this API version puts it
    pub fn subscription_metadata(&self) -> Option<&HashMap<String, String>> {
        self.parent
            .as_ref()
            .and_then(|p| p.subscription_details.as_ref())
            .or(self.subscription_details.as_ref())
            .and_then(|d| d.metadata.as_ref())
    }
}

// =============================================================================
// Subscription Types
// =============================================================================

/// Stripe subscription object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription ID (sub_...)
    pub id: String,
    #[serde(default)]
    pub customer: Option<ObjectRef>,
    /// Stripe-side status, e.g. `canceled`
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl Subscription {
    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(ObjectRef::id)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
