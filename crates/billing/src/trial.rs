//! Trial lifecycle checks: "trial ending" and "trial ended".
//!
//! Both checks share one shape and differ only in window and flag key. The
//! windows overlap by a 24h look-back on purpose: a delayed or skipped run
//! still catches organizations that crossed the threshold since the last
//! successful run, and the notification flag, not the window, prevents
//! re-notification.

use std::sync::Arc;

use cream_shared::subscription_flags;
use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::directory::OrganizationDirectory;
use crate::error::ReconcileResult;
use crate::events::{DomainEvent, EventBus};
use crate::guard::{FlagTarget, NotificationGuard};
use crate::pipeline::{RunReport, SkipReason};
use crate::provider::BillingProvider;
use crate::queries::ReconciliationQueries;

/// Look-back shared by both checks.
const LOOKBACK: Duration = Duration::hours(24);
/// Look-ahead for the "trial ending" check.
const ENDING_LOOKAHEAD: Duration = Duration::hours(72);

#[derive(Debug, Clone, Copy)]
enum TrialPhase {
    Ending,
    Ended,
}

impl TrialPhase {
    fn window(self, now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
        match self {
            TrialPhase::Ending => (now - LOOKBACK, now + ENDING_LOOKAHEAD),
            TrialPhase::Ended => (now - LOOKBACK, now),
        }
    }

    fn flag_key(self) -> &'static str {
        match self {
            TrialPhase::Ending => subscription_flags::NOTIFIED_TRIAL_ENDING,
            TrialPhase::Ended => subscription_flags::NOTIFIED_TRIAL_ENDED,
        }
    }

    fn event(self, org: &cream_shared::Organization) -> DomainEvent {
        match self {
            TrialPhase::Ending => DomainEvent::trial_ending(org),
            TrialPhase::Ended => DomainEvent::trial_ended(org),
        }
    }

    fn check_name(self) -> &'static str {
        match self {
            TrialPhase::Ending => "trial-ending",
            TrialPhase::Ended => "trial-ended",
        }
    }
}

pub struct TrialLifecycleReconciler {
    queries: ReconciliationQueries,
    guard: NotificationGuard,
    bus: Arc<dyn EventBus>,
}

impl TrialLifecycleReconciler {
    pub fn new(
        directory: Arc<dyn OrganizationDirectory>,
        provider: Arc<dyn BillingProvider>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            queries: ReconciliationQueries::new(directory, provider.clone()),
            guard: NotificationGuard::new(provider),
            bus,
        }
    }

    /// Notify organizations whose trial ends within the next 72 hours.
    pub async fn check_trial_ending(&self) -> ReconcileResult<RunReport> {
        self.check_trial_ending_at(OffsetDateTime::now_utc()).await
    }

    pub async fn check_trial_ending_at(&self, now: OffsetDateTime) -> ReconcileResult<RunReport> {
        self.run(TrialPhase::Ending, now).await
    }

    /// Notify organizations whose trial ended within the last 24 hours.
    pub async fn check_trial_ended(&self) -> ReconcileResult<RunReport> {
        self.check_trial_ended_at(OffsetDateTime::now_utc()).await
    }

    pub async fn check_trial_ended_at(&self, now: OffsetDateTime) -> ReconcileResult<RunReport> {
        self.run(TrialPhase::Ended, now).await
    }

    async fn run(&self, phase: TrialPhase, now: OffsetDateTime) -> ReconcileResult<RunReport> {
        let tid = Uuid::new_v4();
        let (window_start, window_end) = phase.window(now);
        let flag_key = phase.flag_key();

        let candidates = self
            .queries
            .organizations_in_trial_window(window_start, window_end)
            .await?;

        info!(
            tid = %tid,
            check = phase.check_name(),
            candidates = candidates.len(),
            "Scanning organizations in trial window"
        );

        let mut report = RunReport::new();
        for candidate in candidates {
            let org = &candidate.organization;

            if NotificationGuard::has_been_notified(&candidate.subscription.metadata, flag_key) {
                debug!(tid = %tid, org_id = org.id, flag = flag_key, "Already notified");
                report.record_skipped(org.id, SkipReason::AlreadyNotified);
                continue;
            }

            if candidate.subscription.id.is_empty() {
                warn!(tid = %tid, org_id = org.id, "Subscription has no id, dropping");
                report.record_skipped(org.id, SkipReason::SubscriptionIdMissing);
                continue;
            }

            match self
                .guard
                .mark_notified(
                    FlagTarget::Subscription(&candidate.subscription.id),
                    flag_key,
                    now,
                )
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => {
                    warn!(
                        tid = %tid,
                        org_id = org.id,
                        error = %err,
                        "Failed to set notification flag, dropping"
                    );
                    report.record_skipped(org.id, SkipReason::FlagWriteFailed(err.to_string()));
                    continue;
                }
                Err(err) => return Err(err),
            }

            let event = phase.event(org);
            if let Err(err) = self.bus.publish(tid, &event).await {
                // The flag is already set, so the next run will not retry.
                // The gap surfaces in logs and in the missing downstream
                // event.
                error!(
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
            check = phase.check_name(),
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            "Trial check complete"
        );
        Ok(report)
    }
}
