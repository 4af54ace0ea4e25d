// Shared crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Cream Shared Types
//!
//! Domain types shared between the reconciliation engine and the worker:
//! organizations from the big-poppa registry, subscriptions and invoices from
//! the billing provider, and the recognized notification-flag metadata keys.

pub mod flags;
pub mod types;

pub use flags::{
    customer_keys, invoice_flags, subscription_flags,
};
pub use types::{
    to_iso8601, Invoice, Organization, PaymentMethodOwner, Subscription, SubscriptionStatus,
};
