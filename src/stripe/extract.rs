//! Locating the subscription an event object refers to.
//!
//! Stripe moved the subscription reference on invoices between API versions
//! (`invoice.subscription`, then `invoice.parent.subscription_details`), and
//! line items carry it in yet another place. Candidates are tried in order and
//! the first well-formed one wins.

use serde_json::Value;

/// Candidate locations, most direct first
const SUBSCRIPTION_POINTERS: &[&str] = &[
    "/subscription",
    "/parent/subscription_details/subscription",
    "/subscription_details/subscription",
    "/lines/data/0/subscription",
    "/lines/data/0/parent/subscription_item_details/subscription",
    "/lines/data/0/parent/invoice_item_details/subscription",
];

/// Find the subscription ID referenced by a checkout session or invoice.
///
/// A candidate matches when it is a `sub_...` ID string or an expanded object
/// with a non-empty `id`.
pub fn extract_subscription_id(object: &Value) -> Option<String> {
    SUBSCRIPTION_POINTERS
        .iter()
        .filter_map(|pointer| object.pointer(pointer))
        .find_map(subscription_ref)
}

fn subscription_ref(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if is_subscription_id(id) => Some(id.clone()),
        Value::Object(map) => map
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn is_subscription_id(id: &str) -> bool {
    id.strip_prefix("sub_").is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}
