//! Candidate selection for the lifecycle checks.
//!
//! Composes a directory query with post-fetch filters the directory's query
//! language cannot express. No side effects beyond the delegated fetches.

use std::sync::Arc;

use cream_shared::{Organization, Subscription};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::directory::{OrganizationDirectory, OrganizationFilter, TimeRange};
use crate::error::ReconcileResult;
use crate::provider::BillingProvider;

/// How recently an organization must have entered the grace window to stay a
/// candidate for the payment-failure check.
const GRACE_RECENCY: Duration = Duration::hours(24);

/// A candidate organization annotated with its fetched subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationWithSubscription {
    pub organization: Organization,
    pub subscription: Subscription,
}

#[derive(Clone)]
pub struct ReconciliationQueries {
    directory: Arc<dyn OrganizationDirectory>,
    provider: Arc<dyn BillingProvider>,
}

impl ReconciliationQueries {
    pub fn new(
        directory: Arc<dyn OrganizationDirectory>,
        provider: Arc<dyn BillingProvider>,
    ) -> Self {
        Self {
            directory,
            provider,
        }
    }

    /// Organizations without a payment method whose trial ends strictly
    /// inside `(window_start, window_end)`, each annotated with its fetched
    /// subscription.
    ///
    /// Organizations whose subscription fetch fails with a recoverable error
    /// are dropped silently; some organizations exist in the directory
    /// without ever reaching the billing provider.
    pub async fn organizations_in_trial_window(
        &self,
        window_start: OffsetDateTime,
        window_end: OffsetDateTime,
    ) -> ReconcileResult<Vec<OrganizationWithSubscription>> {
        let filter = OrganizationFilter::new()
            .has_payment_method(false)
            .billing_customer_present()
            .trial_end(TimeRange::between(window_start, window_end));

        let organizations = self.directory.query_organizations(&filter).await?;

        let mut candidates = Vec::with_capacity(organizations.len());
        for organization in organizations {
            let Some(customer_ref) = organization.stripe_customer_id.clone() else {
                // The filter guarantees a reference; tolerate stale rows.
                continue;
            };
            match self
                .provider
                .get_subscription_for_customer(&customer_ref)
                .await
            {
                Ok(subscription) => candidates.push(OrganizationWithSubscription {
                    organization,
                    subscription,
                }),
                Err(err) if err.is_recoverable() => {
                    debug!(
                        org_id = organization.id,
                        error = %err,
                        "Dropping organization without a fetchable subscription"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(candidates)
    }

    /// Organizations past trial and active period but still inside grace,
    /// restricted to those that entered this terminal window within the last
    /// 24 hours.
    pub async fn organizations_near_grace_period_end(
        &self,
        now: OffsetDateTime,
    ) -> ReconcileResult<Vec<Organization>> {
        let filter = OrganizationFilter::new()
            .has_payment_method(true)
            .billing_customer_present()
            .trial_end(TimeRange::less_than(now))
            .active_period_end(TimeRange::less_than(now))
            .grace_period_end(TimeRange::more_than(now));

        let mut organizations = self.directory.query_organizations(&filter).await?;

        // The directory cannot express "just became eligible"; bound the
        // candidates to organizations whose trial or active period ended
        // within the last day.
        let cutoff = now - GRACE_RECENCY;
        organizations.retain(|org| org.trial_end > cutoff || org.active_period_end > cutoff);

        Ok(organizations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{org, sub, FakeDirectory, FakeProvider};
    use time::macros::datetime;

    fn queries(
        directory: Arc<FakeDirectory>,
        provider: Arc<FakeProvider>,
    ) -> ReconciliationQueries {
        ReconciliationQueries::new(directory, provider)
    }

    #[tokio::test]
    async fn trial_window_excludes_orgs_with_payment_method() {
        let now = datetime!(2016-08-15 00:00 UTC);
        let directory = Arc::new(FakeDirectory::new());
        let provider = Arc::new(FakeProvider::new());

        let mut in_window = org(1);
        in_window.trial_end = now + Duration::hours(10);
        provider.put_subscription(&in_window, sub("sub_1"));

        let mut has_card = org(2);
        has_card.trial_end = now + Duration::hours(10);
        has_card.has_payment_method = true;
        provider.put_subscription(&has_card, sub("sub_2"));

        directory.put(in_window);
        directory.put(has_card);

        let candidates = queries(directory, provider)
            .organizations_in_trial_window(now - Duration::hours(24), now + Duration::hours(72))
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].organization.id, 1);
        assert_eq!(candidates[0].subscription.id, "sub_1");
    }

    #[tokio::test]
    async fn trial_window_drops_unfetchable_subscriptions_silently() {
        let now = datetime!(2016-08-15 00:00 UTC);
        let directory = Arc::new(FakeDirectory::new());
        let provider = Arc::new(FakeProvider::new());

        let mut reachable = org(1);
        reachable.trial_end = now - Duration::hours(1);
        provider.put_subscription(&reachable, sub("sub_1"));

        // Never reached the billing provider: no subscription stored.
        let mut stripeless = org(2);
        stripeless.trial_end = now - Duration::hours(1);

        directory.put(reachable);
        directory.put(stripeless);

        let candidates = queries(directory, provider)
            .organizations_in_trial_window(now - Duration::hours(24), now)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].organization.id, 1);
    }

    #[tokio::test]
    async fn empty_directory_result_is_not_an_error() {
        let directory = Arc::new(FakeDirectory::new());
        let provider = Arc::new(FakeProvider::new());
        let now = datetime!(2016-08-15 00:00 UTC);

        let candidates = queries(directory.clone(), provider.clone())
            .organizations_in_trial_window(now - Duration::hours(24), now)
            .await
            .unwrap();
        assert!(candidates.is_empty());

        let grace = queries(directory, provider)
            .organizations_near_grace_period_end(now)
            .await
            .unwrap();
        assert!(grace.is_empty());
    }

    #[tokio::test]
    async fn grace_period_filter_keeps_only_recent_entrants() {
        let now = datetime!(2016-08-15 12:00 UTC);
        let directory = Arc::new(FakeDirectory::new());
        let provider = Arc::new(FakeProvider::new());

        // Entered the grace window 6 hours ago.
        let mut fresh = org(1);
        fresh.has_payment_method = true;
        fresh.trial_end = now - Duration::days(30);
        fresh.active_period_end = now - Duration::hours(6);
        fresh.grace_period_end = now + Duration::hours(66);

        // Eligible for weeks; the lifecycle checks already saw it.
        let mut stale = org(2);
        stale.has_payment_method = true;
        stale.trial_end = now - Duration::days(30);
        stale.active_period_end = now - Duration::days(10);
        stale.grace_period_end = now + Duration::hours(1);

        directory.put(fresh);
        directory.put(stale);

        let organizations = queries(directory, provider)
            .organizations_near_grace_period_end(now)
            .await
            .unwrap();

        assert_eq!(organizations.len(), 1);
        assert_eq!(organizations[0].id, 1);
    }

    #[tokio::test]
    async fn grace_period_filter_requires_open_grace_window() {
        let now = datetime!(2016-08-15 12:00 UTC);
        let directory = Arc::new(FakeDirectory::new());
        let provider = Arc::new(FakeProvider::new());

        let mut grace_over = org(1);
        grace_over.has_payment_method = true;
        grace_over.trial_end = now - Duration::days(30);
        grace_over.active_period_end = now - Duration::hours(6);
        grace_over.grace_period_end = now - Duration::minutes(1);
        directory.put(grace_over);

        let organizations = queries(directory, provider)
            .organizations_near_grace_period_end(now)
            .await
            .unwrap();

        assert!(organizations.is_empty());
    }
}
