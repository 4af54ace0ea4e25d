//! Domain events and the publish-only event bus seam.
//!
//! Events are fire-and-forget. Delivery is at-least-once from the publisher's
//! perspective, so idempotence comes from the notification flags, never from
//! the bus.

use async_trait::async_trait;
use cream_shared::{Organization, PaymentMethodOwner};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReconcileResult;

/// Event names, as downstream consumers subscribe to them.
pub mod names {
    pub const TRIAL_ENDING: &str = "organization.trial.ending";
    pub const TRIAL_ENDED: &str = "organization.trial.ended";
    pub const INVOICE_PAYMENT_FAILED: &str = "organization.invoice.payment-failed";
}

/// Organization identity carried in every event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationRef {
    pub id: i64,
    pub name: String,
}

impl From<&Organization> for OrganizationRef {
    fn from(org: &Organization) -> Self {
        Self {
            id: org.id,
            name: org.name.clone(),
        }
    }
}

/// Payment-method owner identity for payment-failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodOwnerRef {
    pub github_id: i64,
}

impl From<&PaymentMethodOwner> for PaymentMethodOwnerRef {
    fn from(owner: &PaymentMethodOwner) -> Self {
        Self {
            github_id: owner.github_id,
        }
    }
}

/// An immutable lifecycle event emitted by the reconcilers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum DomainEvent {
    TrialEnding {
        organization: OrganizationRef,
    },
    TrialEnded {
        organization: OrganizationRef,
    },
    InvoicePaymentFailed {
        invoice_payment_has_failed_for_24_hours: bool,
        organization: OrganizationRef,
        payment_method_owner: PaymentMethodOwnerRef,
    },
}

impl DomainEvent {
    pub fn trial_ending(org: &Organization) -> Self {
        Self::TrialEnding {
            organization: org.into(),
        }
    }

    pub fn trial_ended(org: &Organization) -> Self {
        Self::TrialEnded {
            organization: org.into(),
        }
    }

    pub fn invoice_payment_failed(org: &Organization, owner: &PaymentMethodOwner) -> Self {
        Self::InvoicePaymentFailed {
            invoice_payment_has_failed_for_24_hours: true,
            organization: org.into(),
            payment_method_owner: owner.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TrialEnding { .. } => names::TRIAL_ENDING,
            Self::TrialEnded { .. } => names::TRIAL_ENDED,
            Self::InvoicePaymentFailed { .. } => names::INVOICE_PAYMENT_FAILED,
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Publish-only interface for domain events.
///
/// No acknowledgement is awaited beyond the publish call itself.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one event, tagged with the run's correlation id.
    async fn publish(&self, tid: Uuid, event: &DomainEvent) -> ReconcileResult<()>;
}
