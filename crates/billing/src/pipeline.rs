//! Batch bookkeeping for reconciler runs.
//!
//! Each candidate organization flows through a sequence of stages; any stage
//! may exclude it without touching the rest of the batch. Exclusions carry an
//! inspectable [`SkipReason`] instead of living only in logs.

use serde::Serialize;

/// Why an organization was excluded from a run's publish set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The candidate arrived without a billing subscription id.
    SubscriptionIdMissing,
    /// The flag for this check is already set; the event was emitted by an
    /// earlier run.
    AlreadyNotified,
    /// Writing the notification flag failed; no event was published and the
    /// next run will retry.
    FlagWriteFailed(String),
    /// The current invoice could not be fetched.
    InvoiceUnavailable(String),
    /// Payment-method owner metadata was absent or malformed.
    OwnerUnresolved(String),
    /// The organization has no billing customer reference.
    CustomerReferenceMissing,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::SubscriptionIdMissing => write!(f, "subscription id missing"),
            SkipReason::AlreadyNotified => write!(f, "already notified"),
            SkipReason::FlagWriteFailed(err) => write!(f, "flag write failed: {}", err),
            SkipReason::InvoiceUnavailable(err) => write!(f, "invoice unavailable: {}", err),
            SkipReason::OwnerUnresolved(err) => write!(f, "owner unresolved: {}", err),
            SkipReason::CustomerReferenceMissing => write!(f, "customer reference missing"),
        }
    }
}

/// One excluded organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedOrganization {
    pub organization_id: i64,
    pub reason: SkipReason,
}

/// Outcome of one reconciler run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Organizations that made it through every stage and had their event
    /// published (or at least their flag written).
    pub processed: Vec<i64>,
    /// Organizations excluded by some stage, with the reason.
    pub skipped: Vec<SkippedOrganization>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&mut self, organization_id: i64) {
        self.processed.push(organization_id);
    }

    pub fn record_skipped(&mut self, organization_id: i64, reason: SkipReason) {
        self.skipped.push(SkippedOrganization {
            organization_id,
            reason,
        });
    }

    pub fn skip_reason_for(&self, organization_id: i64) -> Option<&SkipReason> {
        self.skipped
            .iter()
            .find(|s| s.organization_id == organization_id)
            .map(|s| &s.reason)
    }
}
