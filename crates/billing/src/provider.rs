//! Billing provider seam.
//!
//! Query/update interface over the billing subsystem. Reconcilers receive a
//! provider at construction; the production implementation is
//! [`crate::stripe_provider::StripeProvider`].

use std::collections::HashMap;

use async_trait::async_trait;
use cream_shared::{Invoice, PaymentMethodOwner, Subscription};

use crate::error::ReconcileResult;

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Fetch the subscription linked to a billing customer. Fails with
    /// `NotFound` if the customer has none.
    async fn get_subscription_for_customer(
        &self,
        customer_ref: &str,
    ) -> ReconcileResult<Subscription>;

    /// Merge metadata keys into a subscription. Keys absent from the patch
    /// are left untouched.
    async fn update_subscription_metadata(
        &self,
        subscription_id: &str,
        patch: HashMap<String, String>,
    ) -> ReconcileResult<Subscription>;

    /// Fetch the most recently created invoice for a customer. Fails with
    /// `NotFound` if the customer has none.
    async fn get_current_invoice(&self, customer_ref: &str) -> ReconcileResult<Invoice>;

    /// Merge metadata keys into an invoice. Keys absent from the patch are
    /// left untouched.
    async fn update_invoice_metadata(
        &self,
        invoice_id: &str,
        patch: HashMap<String, String>,
    ) -> ReconcileResult<Invoice>;

    /// Resolve the payment-method owner from customer metadata. Fails with
    /// `NotFound` when the owner keys are absent or non-numeric.
    async fn get_payment_method_owner(
        &self,
        customer_ref: &str,
    ) -> ReconcileResult<PaymentMethodOwner>;
}
