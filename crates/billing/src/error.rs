//! Error types for the reconciliation engine.
//!
//! The taxonomy mirrors how failures are handled:
//!
//! - [`ReconcileError::NotFound`], [`ReconcileError::Provider`],
//!   [`ReconcileError::Directory`], and [`ReconcileError::Bus`] are
//!   recoverable at per-organization granularity: the batch drops the
//!   organization and continues. No flag was written, so the next scheduled
//!   run retries naturally.
//! - [`ReconcileError::Validation`] and [`ReconcileError::Unexpected`] abort
//!   the whole run. They indicate a malformed job payload or a defect, not an
//!   environmental condition.

use thiserror::Error;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A remote object (subscription, invoice, payment-method owner) is
    /// absent where one was expected.
    #[error("{kind} not found for {reference}")]
    NotFound { kind: &'static str, reference: String },

    /// The billing provider rejected or failed a call.
    #[error("billing provider error: {0}")]
    Provider(String),

    /// The organization directory rejected or failed a call.
    #[error("organization directory error: {0}")]
    Directory(String),

    /// The event bus failed to accept a publish.
    #[error("event bus error: {0}")]
    Bus(String),

    /// Malformed input, surfaced to the scheduler as a stop-signal.
    #[error("validation error: {0}")]
    Validation(String),

    /// A programming error. Never absorbed by the per-organization drop
    /// policy.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ReconcileError {
    pub fn not_found(kind: &'static str, reference: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            reference: reference.into(),
        }
    }

    /// Whether the batch may absorb this error by dropping the organization.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Provider(_) | Self::Directory(_) | Self::Bus(_)
        )
    }
}

impl From<stripe::StripeError> for ReconcileError {
    fn from(err: stripe::StripeError) -> Self {
        Self::Provider(err.to_string())
    }
}

impl From<reqwest::Error> for ReconcileError {
    fn from(err: reqwest::Error) -> Self {
        Self::Directory(err.to_string())
    }
}

impl From<redis::RedisError> for ReconcileError {
    fn from(err: redis::RedisError) -> Self {
        Self::Bus(err.to_string())
    }
}

impl From<time::error::Format> for ReconcileError {
    fn from(err: time::error::Format) -> Self {
        Self::Unexpected(err.into())
    }
}
