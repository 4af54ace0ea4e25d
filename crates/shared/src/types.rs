//! Domain types for organizations, subscriptions, and invoices.
//!
//! Organizations are owned by the big-poppa registry and arrive as camelCase
//! JSON with RFC 3339 timestamps. Subscription and invoice types are a narrow
//! projection of the billing provider's objects: only the fields the
//! reconcilers read survive the mapping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// An organization as the big-poppa registry reports it.
///
/// Cream never creates organizations; it reads them and issues narrow field
/// updates at most.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: i64,
    pub github_id: i64,
    pub name: String,
    /// Opaque billing customer reference (`cus_...`), absent for
    /// organizations that never reached the billing provider.
    pub stripe_customer_id: Option<String>,
    /// Opaque billing subscription reference (`sub_...`).
    pub stripe_subscription_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub trial_end: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub active_period_end: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub grace_period_end: OffsetDateTime,
    pub has_payment_method: bool,
    pub allowed: bool,
}

/// Billing-provider subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Unpaid,
    Canceled,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Canceled => "canceled",
        };
        write!(f, "{}", s)
    }
}

/// A billing-provider subscription, fetched on demand by customer reference.
///
/// The metadata map doubles as the notification-flag store; see
/// [`crate::flags::subscription_flags`] for the recognized keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub trial_end: Option<OffsetDateTime>,
}

/// A billing-provider invoice.
///
/// The "current" invoice for a customer is the most recently created one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub paid: bool,
    pub closed: bool,
    pub attempted: bool,
    pub created: OffsetDateTime,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// The github-identified user who owns an organization's payment method,
/// derived from billing customer metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodOwner {
    pub id: i64,
    pub github_id: i64,
}

/// Format a timestamp as an ISO 8601 / RFC 3339 string.
///
/// Notification-flag values and event payload timestamps use this format.
pub fn to_iso8601(at: OffsetDateTime) -> Result<String, time::error::Format> {
    at.format(&Rfc3339)
}
