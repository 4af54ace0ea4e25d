//! Organization directory seam.
//!
//! The directory (big-poppa) owns organizations. Cream queries it with
//! [`OrganizationFilter`] predicates and issues narrow partial updates; it
//! never creates organizations.

use async_trait::async_trait;
use cream_shared::Organization;
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::ReconcileResult;

/// Null-check predicate, serialized big-poppa style as `{"isNull": bool}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NullCheck {
    pub is_null: bool,
}

/// Open range over a timestamp column, in UNIX seconds.
///
/// Both bounds are exclusive, matching the directory's `moreThan`/`lessThan`
/// operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub more_than: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub less_than: Option<i64>,
}

impl TimeRange {
    pub fn more_than(at: OffsetDateTime) -> Self {
        Self {
            more_than: Some(at.unix_timestamp()),
            less_than: None,
        }
    }

    pub fn less_than(at: OffsetDateTime) -> Self {
        Self {
            more_than: None,
            less_than: Some(at.unix_timestamp()),
        }
    }

    pub fn between(start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self {
            more_than: Some(start.unix_timestamp()),
            less_than: Some(end.unix_timestamp()),
        }
    }

    fn contains(&self, at: OffsetDateTime) -> bool {
        let ts = at.unix_timestamp();
        self.more_than.is_none_or(|bound| ts > bound)
            && self.less_than.is_none_or(|bound| ts < bound)
    }
}

/// Filter predicates the directory's query language supports.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_payment_method: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<NullCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_end: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_period_end: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period_end: Option<TimeRange>,
}

impl OrganizationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_payment_method(mut self, value: bool) -> Self {
        self.has_payment_method = Some(value);
        self
    }

    /// Keep only organizations with a billing customer reference.
    pub fn billing_customer_present(mut self) -> Self {
        self.stripe_customer_id = Some(NullCheck { is_null: false });
        self
    }

    pub fn trial_end(mut self, range: TimeRange) -> Self {
        self.trial_end = Some(range);
        self
    }

    pub fn active_period_end(mut self, range: TimeRange) -> Self {
        self.active_period_end = Some(range);
        self
    }

    pub fn grace_period_end(mut self, range: TimeRange) -> Self {
        self.grace_period_end = Some(range);
        self
    }

    /// Reference semantics of the filter, as the directory evaluates it.
    ///
    /// In-memory directory doubles use this to stay faithful to the remote
    /// query language.
    pub fn matches(&self, org: &Organization) -> bool {
        if let Some(expected) = self.has_payment_method {
            if org.has_payment_method != expected {
                return false;
            }
        }
        if let Some(check) = self.stripe_customer_id {
            if org.stripe_customer_id.is_none() != check.is_null {
                return false;
            }
        }
        if let Some(range) = self.trial_end {
            if !range.contains(org.trial_end) {
                return false;
            }
        }
        if let Some(range) = self.active_period_end {
            if !range.contains(org.active_period_end) {
                return false;
            }
        }
        if let Some(range) = self.grace_period_end {
            if !range.contains(org.grace_period_end) {
                return false;
            }
        }
        true
    }
}

/// Partial update accepted by the directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_payment_method: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_subscription_id: Option<String>,
}

/// Query/update interface over the organization registry.
#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
    /// Fetch organizations matching every predicate in the filter. Zero rows
    /// is an empty vec, not an error.
    async fn query_organizations(
        &self,
        filter: &OrganizationFilter,
    ) -> ReconcileResult<Vec<Organization>>;

    /// Apply a partial update and return the updated organization.
    ///
    /// The reconcilers never call this, but other cream callers rely on it
    /// being part of the directory contract.
    async fn update_organization(
        &self,
        id: i64,
        patch: &OrganizationPatch,
    ) -> ReconcileResult<Organization>;
}
