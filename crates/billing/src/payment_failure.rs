//! Payment-failure check: invoice unpaid for 24 hours inside grace.
//!
//! Idempotence is scoped to the invoice, not the subscription: a new billing
//! period produces a new invoice, and a failure on that invoice is a
//! legitimately new thing to notify about.

use std::sync::Arc;

use cream_shared::invoice_flags;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::directory::OrganizationDirectory;
use crate::error::ReconcileResult;
use crate::events::{DomainEvent, EventBus};
use crate::guard::{FlagTarget, NotificationGuard};
use crate::pipeline::{RunReport, SkipReason};
use crate::provider::BillingProvider;
use crate::queries::ReconciliationQueries;

pub struct PaymentFailureReconciler {
    queries: ReconciliationQueries,
    guard: NotificationGuard,
    provider: Arc<dyn BillingProvider>,
    bus: Arc<dyn EventBus>,
}

impl PaymentFailureReconciler {
    pub fn new(
        directory: Arc<dyn OrganizationDirectory>,
        provider: Arc<dyn BillingProvider>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            queries: ReconciliationQueries::new(directory, provider.clone()),
            guard: NotificationGuard::new(provider.clone()),
            provider,
            bus,
        }
    }

    /// Notify organizations whose current invoice has been failing for 24
    /// hours while they sit in the grace window.
    pub async fn check_invoice_payment_failed_for_24_hours(&self) -> ReconcileResult<RunReport> {
        self.check_invoice_payment_failed_for_24_hours_at(OffsetDateTime::now_utc())
            .await
    }

    pub async fn check_invoice_payment_failed_for_24_hours_at(
        &self,
        now: OffsetDateTime,
    ) -> ReconcileResult<RunReport> {
        let tid = Uuid::new_v4();
        let candidates = self.queries.organizations_near_grace_period_end(now).await?;

        info!(
            tid = %tid,
            candidates = candidates.len(),
            "Scanning organizations near grace period end"
        );

        let mut report = RunReport::new();
        for org in candidates {
            let Some(customer_ref) = org.stripe_customer_id.clone() else {
                report.record_skipped(org.id, SkipReason::CustomerReferenceMissing);
                continue;
            };

            // Stage: fetch the current invoice.
            let invoice = match self.provider.get_current_invoice(&customer_ref).await {
                Ok(invoice) => invoice,
                Err(err) if err.is_recoverable() => {
                    warn!(tid = %tid, org_id = org.id, error = %err, "Invoice fetch failed, dropping");
                    report.record_skipped(org.id, SkipReason::InvoiceUnavailable(err.to_string()));
                    continue;
                }
                Err(err) => return Err(err),
            };

            // Stage: invoice-scoped idempotence.
            if NotificationGuard::has_been_notified(
                &invoice.metadata,
                invoice_flags::NOTIFIED_ALL_MEMBERS_PAYMENT_FAILED,
            ) {
                debug!(tid = %tid, org_id = org.id, invoice_id = %invoice.id, "Already notified");
                report.record_skipped(org.id, SkipReason::AlreadyNotified);
                continue;
            }

            // Stage: resolve the payment-method owner. Failure here is a
            // data-quality guard, not a retryable condition.
            let owner = match self.provider.get_payment_method_owner(&customer_ref).await {
                Ok(owner) => owner,
                Err(err) if err.is_recoverable() => {
                    warn!(tid = %tid, org_id = org.id, error = %err, "Owner resolution failed, dropping");
                    report.record_skipped(org.id, SkipReason::OwnerUnresolved(err.to_string()));
                    continue;
                }
                Err(err) => return Err(err),
            };

            // Stage: write the flag, then publish.
            match self
                .guard
                .mark_notified(
                    FlagTarget::Invoice(&invoice.id),
                    invoice_flags::NOTIFIED_ALL_MEMBERS_PAYMENT_FAILED,
                    now,
                )
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => {
                    warn!(tid = %tid, org_id = org.id, error = %err, "Failed to set notification flag, dropping");
                    report.record_skipped(org.id, SkipReason::FlagWriteFailed(err.to_string()));
                    continue;
                }
                Err(err) => return Err(err),
            }

            let event = DomainEvent::invoice_payment_failed(&org, &owner);
            if let Err(err) = self.bus.publish(tid, &event).await {
                tracing::error!(
                    tid = %tid,
                    org_id = org.id,
                    event = event.name(),
                    error = %err,
                    "Failed to publish event after setting flag"
                );
            }
            report.record_processed(org.id);
        }

        info!(
            tid = %tid,
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            "Payment failure check complete"
        );
        Ok(report)
    }
}
