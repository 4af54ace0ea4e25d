// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Cream Billing Reconciliation
//!
//! Reconciles organization subscription state between the billing provider
//! (Stripe) and the big-poppa organization registry, emitting lifecycle
//! events at most once per organization and transition.
//!
//! ## Checks
//!
//! - **Trial ending**: trial ends within the next 72 hours
//! - **Trial ended**: trial ended within the last 24 hours
//! - **Payment failure**: current invoice failing for 24 hours inside grace
//!
//! Every check runs as an independent batch: each candidate organization is
//! fetched, guarded against re-notification by a metadata flag on the remote
//! billing object, flagged, and only then announced on the event bus. A
//! failure for one organization never aborts the rest of the batch.

pub mod bigpoppa;
pub mod bus;
pub mod directory;
pub mod error;
pub mod events;
pub mod guard;
pub mod payment_failure;
pub mod pipeline;
pub mod provider;
pub mod queries;
pub mod stripe_provider;
pub mod trial;

#[cfg(test)]
pub(crate) mod test_support;

// Directory
pub use bigpoppa::BigPoppaClient;
pub use directory::{
    NullCheck, OrganizationDirectory, OrganizationFilter, OrganizationPatch, TimeRange,
};

// Provider
pub use provider::BillingProvider;
pub use stripe_provider::{StripeConfig, StripeProvider};

// Events
pub use bus::RedisEventBus;
pub use events::{DomainEvent, EventBus, OrganizationRef, PaymentMethodOwnerRef};

// Engine
pub use error::{ReconcileError, ReconcileResult};
pub use guard::{FlagTarget, NotificationGuard};
pub use payment_failure::PaymentFailureReconciler;
pub use pipeline::{RunReport, SkipReason, SkippedOrganization};
pub use queries::{OrganizationWithSubscription, ReconciliationQueries};
pub use trial::TrialLifecycleReconciler;

use std::sync::Arc;

/// Main reconciliation service combining every scheduled check.
pub struct ReconcilerService {
    pub trial: TrialLifecycleReconciler,
    pub payment_failure: PaymentFailureReconciler,
}

impl ReconcilerService {
    /// Build the service from its three collaborators.
    pub fn new(
        directory: Arc<dyn OrganizationDirectory>,
        provider: Arc<dyn BillingProvider>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            trial: TrialLifecycleReconciler::new(
                directory.clone(),
                provider.clone(),
                bus.clone(),
            ),
            payment_failure: PaymentFailureReconciler::new(directory, provider, bus),
        }
    }
}
