//! Notification guard: the idempotence primitive shared by every reconciler.
//!
//! The rule is always read-flag, act, write-flag, emit-event. The write
//! happens only after the guarded action succeeds, and the event only after
//! the write succeeds. Because the flag lives on a remote object there is a
//! narrow race window between read and write; the guard keeps it as small as
//! the provider allows and the overlapping check windows absorb the rest.

use std::collections::HashMap;
use std::sync::Arc;

use cream_shared::to_iso8601;
use time::OffsetDateTime;

use crate::error::ReconcileResult;
use crate::provider::BillingProvider;

/// Which remote object carries the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTarget<'a> {
    Subscription(&'a str),
    Invoice(&'a str),
}

#[derive(Clone)]
pub struct NotificationGuard {
    provider: Arc<dyn BillingProvider>,
}

impl NotificationGuard {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    /// True iff the flag key is present with a non-empty value.
    pub fn has_been_notified(metadata: &HashMap<String, String>, flag_key: &str) -> bool {
        metadata.get(flag_key).is_some_and(|value| !value.is_empty())
    }

    /// Record that the organization has been notified, by merging a
    /// single-key metadata patch into the target object.
    ///
    /// Unrelated metadata keys are never touched. Once written the flag is
    /// never cleared by cream.
    pub async fn mark_notified(
        &self,
        target: FlagTarget<'_>,
        flag_key: &str,
        at: OffsetDateTime,
    ) -> ReconcileResult<()> {
        let mut patch = HashMap::new();
        patch.insert(flag_key.to_string(), to_iso8601(at)?);

        match target {
            FlagTarget::Subscription(id) => {
                self.provider.update_subscription_metadata(id, patch).await?;
            }
            FlagTarget::Invoice(id) => {
                self.provider.update_invoice_metadata(id, patch).await?;
            }
        }
        Ok(())
    }
}
