//! In-memory collaborator doubles shared across this crate's tests.
//!
//! The directory double evaluates filters with
//! [`OrganizationFilter::matches`], so query tests exercise the same
//! predicate semantics the remote registry applies.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use cream_shared::{
    Invoice, Organization, PaymentMethodOwner, Subscription, SubscriptionStatus,
};
use time::macros::datetime;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::directory::{OrganizationDirectory, OrganizationFilter, OrganizationPatch};
use crate::error::{ReconcileError, ReconcileResult};
use crate::events::{DomainEvent, EventBus};
use crate::provider::BillingProvider;

pub fn org(id: i64) -> Organization {
    Organization {
        id,
        github_id: id * 1000,
        name: format!("org-{}", id),
        stripe_customer_id: Some(format!("cus_{}", id)),
        stripe_subscription_id: None,
        trial_end: datetime!(2016-01-01 00:00 UTC),
        active_period_end: datetime!(2016-01-01 00:00 UTC),
        grace_period_end: datetime!(2016-01-01 00:00 UTC),
        has_payment_method: false,
        allowed: true,
    }
}

pub fn sub(id: &str) -> Subscription {
    Subscription {
        id: id.to_string(),
        status: SubscriptionStatus::Trialing,
        metadata: HashMap::new(),
        trial_end: None,
    }
}

pub fn invoice(id: &str, created: OffsetDateTime) -> Invoice {
    Invoice {
        id: id.to_string(),
        paid: false,
        closed: false,
        attempted: true,
        created,
        metadata: HashMap::new(),
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    organizations: Mutex<Vec<Organization>>,
    fail: AtomicBool,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, organization: Organization) {
        self.organizations.lock().unwrap().push(organization);
    }

    pub fn fail_queries(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrganizationDirectory for FakeDirectory {
    async fn query_organizations(
        &self,
        filter: &OrganizationFilter,
    ) -> ReconcileResult<Vec<Organization>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReconcileError::Directory("connection refused".into()));
        }
        Ok(self
            .organizations
            .lock()
            .unwrap()
            .iter()
            .filter(|org| filter.matches(org))
            .cloned()
            .collect())
    }

    async fn update_organization(
        &self,
        id: i64,
        patch: &OrganizationPatch,
    ) -> ReconcileResult<Organization> {
        let mut organizations = self.organizations.lock().unwrap();
        let org = organizations
            .iter_mut()
            .find(|org| org.id == id)
            .ok_or_else(|| ReconcileError::not_found("organization", id.to_string()))?;
        if let Some(has_payment_method) = patch.has_payment_method {
            org.has_payment_method = has_payment_method;
        }
        if let Some(customer) = &patch.stripe_customer_id {
            org.stripe_customer_id = Some(customer.clone());
        }
        if let Some(subscription) = &patch.stripe_subscription_id {
            org.stripe_subscription_id = Some(subscription.clone());
        }
        Ok(org.clone())
    }
}

#[derive(Default)]
pub struct FakeProvider {
    /// customer ref -> subscription id
    customer_subscriptions: Mutex<HashMap<String, String>>,
    /// subscription id -> subscription
    subscriptions: Mutex<HashMap<String, Subscription>>,
    /// customer ref -> invoices
    invoices: Mutex<HashMap<String, Vec<Invoice>>>,
    /// customer ref -> owner
    owners: Mutex<HashMap<String, PaymentMethodOwner>>,
    failed_subscription_updates: Mutex<HashSet<String>>,
    subscription_patches: Mutex<HashMap<String, Vec<HashMap<String, String>>>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn customer_ref(org: &Organization) -> String {
        org.stripe_customer_id.clone().unwrap_or_default()
    }

    pub fn put_subscription(&self, org: &Organization, subscription: Subscription) {
        self.customer_subscriptions
            .lock()
            .unwrap()
            .insert(Self::customer_ref(org), subscription.id.clone());
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }

    pub fn subscription(&self, id: &str) -> Option<Subscription> {
        self.subscriptions.lock().unwrap().get(id).cloned()
    }

    pub fn set_subscription_flag(&self, id: &str, key: &str, value: &str) {
        if let Some(subscription) = self.subscriptions.lock().unwrap().get_mut(id) {
            subscription
                .metadata
                .insert(key.to_string(), value.to_string());
        }
    }

    pub fn subscription_patches(&self, id: &str) -> Vec<HashMap<String, String>> {
        self.subscription_patches
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_subscription_update(&self, id: &str) {
        self.failed_subscription_updates
            .lock()
            .unwrap()
            .insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failed_subscription_updates.lock().unwrap().clear();
    }

    pub fn put_invoice(&self, org: &Organization, invoice: Invoice) {
        self.invoices
            .lock()
            .unwrap()
            .entry(Self::customer_ref(org))
            .or_default()
            .push(invoice);
    }

    pub fn invoice(&self, id: &str) -> Option<Invoice> {
        self.invoices
            .lock()
            .unwrap()
            .values()
            .flatten()
            .find(|invoice| invoice.id == id)
            .cloned()
    }

    pub fn put_owner(&self, org: &Organization, owner: PaymentMethodOwner) {
        self.owners
            .lock()
            .unwrap()
            .insert(Self::customer_ref(org), owner);
    }
}

#[async_trait]
impl BillingProvider for FakeProvider {
    async fn get_subscription_for_customer(
        &self,
        customer_ref: &str,
    ) -> ReconcileResult<Subscription> {
        let subscription_id = self
            .customer_subscriptions
            .lock()
            .unwrap()
            .get(customer_ref)
            .cloned()
            .ok_or_else(|| ReconcileError::not_found("subscription", customer_ref))?;
        self.subscriptions
            .lock()
            .unwrap()
            .get(&subscription_id)
            .cloned()
            .ok_or_else(|| ReconcileError::not_found("subscription", customer_ref))
    }

    async fn update_subscription_metadata(
        &self,
        subscription_id: &str,
        patch: HashMap<String, String>,
    ) -> ReconcileResult<Subscription> {
        if self
            .failed_subscription_updates
            .lock()
            .unwrap()
            .contains(subscription_id)
        {
            return Err(ReconcileError::Provider("metadata update refused".into()));
        }
        self.subscription_patches
            .lock()
            .unwrap()
            .entry(subscription_id.to_string())
            .or_default()
            .push(patch.clone());

        let mut subscriptions = self.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| ReconcileError::not_found("subscription", subscription_id))?;
        subscription.metadata.extend(patch);
        Ok(subscription.clone())
    }

    async fn get_current_invoice(&self, customer_ref: &str) -> ReconcileResult<Invoice> {
        self.invoices
            .lock()
            .unwrap()
            .get(customer_ref)
            .and_then(|invoices| invoices.iter().max_by_key(|invoice| invoice.created))
            .cloned()
            .ok_or_else(|| ReconcileError::not_found("invoice", customer_ref))
    }

    async fn update_invoice_metadata(
        &self,
        invoice_id: &str,
        patch: HashMap<String, String>,
    ) -> ReconcileResult<Invoice> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices
            .values_mut()
            .flatten()
            .find(|invoice| invoice.id == invoice_id)
            .ok_or_else(|| ReconcileError::not_found("invoice", invoice_id))?;
        invoice.metadata.extend(patch);
        Ok(invoice.clone())
    }

    async fn get_payment_method_owner(
        &self,
        customer_ref: &str,
    ) -> ReconcileResult<PaymentMethodOwner> {
        self.owners
            .lock()
            .unwrap()
            .get(customer_ref)
            .copied()
            .ok_or_else(|| ReconcileError::not_found("payment method owner", customer_ref))
    }
}

#[derive(Default)]
pub struct FakeBus {
    events: Mutex<Vec<(Uuid, DomainEvent)>>,
    fail_next: AtomicBool,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_publish(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(Uuid, DomainEvent)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBus for FakeBus {
    async fn publish(&self, tid: Uuid, event: &DomainEvent) -> ReconcileResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ReconcileError::Bus("stream unavailable".into()));
        }
        self.events.lock().unwrap().push((tid, event.clone()));
        Ok(())
    }
}
