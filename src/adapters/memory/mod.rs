//! In-memory repository adapters.
//!
//! Back the test suites and single-node development. They reproduce the
//! same storage-constraint semantics the PostgreSQL adapters get from
//! unique indexes: duplicate payment inserts resolve to `Duplicate`,
//! duplicate invoice inserts to `AlreadyExists`, preapproval claims to
//! first-writer-wins, webhook event ids to `AlreadyExists`.
//!
//! The backend (memory vs. postgres) is chosen once at process start and
//! injected; nothing downstream branches on it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::billing::{Invoice, Payment, Plan, Subscription};
use crate::domain::foundation::{
    DomainError, InvoiceId, PaymentId, PlanId, SubscriberId, SubscriptionId,
};
use crate::ports::{
    ClaimOutcome, InvoiceInsert, InvoiceRepository, PaymentInsert, PaymentRepository,
    PlanRepository, ProcessingOutcome, SaveResult, SubscriptionRepository, WebhookEventRecord,
    WebhookEventRepository,
};

/// In-memory plan catalog.
#[derive(Default)]
pub struct InMemoryPlanRepository {
    plans: Arc<RwLock<HashMap<PlanId, Plan>>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, DomainError> {
        Ok(self.plans.read().await.get(id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Plan>, DomainError> {
        Ok(self
            .plans
            .read()
            .await
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn save(&self, plan: &Plan) -> Result<(), DomainError> {
        self.plans.write().await.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn set_provider_plan_id(
        &self,
        id: &PlanId,
        provider_plan_id: &str,
    ) -> Result<(), DomainError> {
        let mut plans = self.plans.write().await;
        if let Some(plan) = plans.get_mut(id) {
            plan.provider_plan_id = Some(provider_plan_id.to_string());
        }
        Ok(())
    }
}

/// In-memory subscription store.
#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: Arc<RwLock<HashMap<SubscriptionId, Subscription>>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.subscriptions.read().await.get(id).cloned())
    }

    async fn find_by_subscriber_and_plan(
        &self,
        subscriber_id: &SubscriberId,
        plan_id: &PlanId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| &s.subscriber_id == subscriber_id && &s.plan_id == plan_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn find_by_preapproval_id(
        &self,
        preapproval_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .find(|s| s.preapproval_id.as_deref() == Some(preapproval_id))
            .cloned())
    }

    async fn claim_preapproval(
        &self,
        id: &SubscriptionId,
        preapproval_id: &str,
    ) -> Result<ClaimOutcome, DomainError> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(id)
            .ok_or_else(|| DomainError::database(format!("subscription {} not found", id)))?;

        match &subscription.preapproval_id {
            Some(existing) if existing == preapproval_id => Ok(ClaimOutcome::Claimed),
            Some(_) => Ok(ClaimOutcome::AlreadyClaimed(subscription.clone())),
            None => {
                subscription
                    .assign_preapproval(preapproval_id)
                    .map_err(|e| DomainError::database(e.to_string()))?;
                Ok(ClaimOutcome::Claimed)
            }
        }
    }
}

/// In-memory payment store with provider-payment-id dedup.
#[derive(Default)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payment rows (test helper).
    pub async fn count(&self) -> usize {
        self.payments.read().await.len()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, payment: Payment) -> Result<PaymentInsert, DomainError> {
        let mut payments = self.payments.write().await;
        if let Some(provider_id) = payment.provider_payment_id.as_deref() {
            if let Some(existing) = payments
                .values()
                .find(|p| p.provider_payment_id.as_deref() == Some(provider_id))
            {
                return Ok(PaymentInsert::Duplicate(existing.clone()));
            }
        }
        payments.insert(payment.id, payment.clone());
        Ok(PaymentInsert::Inserted(payment))
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.payments.read().await.get(id).cloned())
    }

    async fn find_by_provider_payment_id(
        &self,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.provider_payment_id.as_deref() == Some(provider_payment_id))
            .cloned())
    }

    async fn list_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<Payment>, DomainError> {
        let mut payments: Vec<Payment> = self
            .payments
            .read()
            .await
            .values()
            .filter(|p| &p.subscription_id == subscription_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn attach_invoice(
        &self,
        payment_id: &PaymentId,
        invoice_id: &InvoiceId,
    ) -> Result<(), DomainError> {
        let mut payments = self.payments.write().await;
        let payment = payments
            .get_mut(payment_id)
            .ok_or_else(|| DomainError::database(format!("payment {} not found", payment_id)))?;
        payment.attach_invoice(*invoice_id);
        Ok(())
    }
}

/// In-memory invoice store with payment-id uniqueness.
#[derive(Default)]
pub struct InMemoryInvoiceRepository {
    invoices: Arc<RwLock<HashMap<InvoiceId, Invoice>>>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored invoices (test helper).
    pub async fn count(&self) -> usize {
        self.invoices.read().await.len()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn insert(&self, invoice: Invoice) -> Result<InvoiceInsert, DomainError> {
        let mut invoices = self.invoices.write().await;
        if let Some(existing) = invoices
            .values()
            .find(|i| i.payment_id == invoice.payment_id)
        {
            return Ok(InvoiceInsert::AlreadyExists(existing.clone()));
        }
        invoices.insert(invoice.id, invoice.clone());
        Ok(InvoiceInsert::Inserted(invoice))
    }

    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, DomainError> {
        Ok(self.invoices.read().await.get(id).cloned())
    }

    async fn find_by_payment_id(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<Invoice>, DomainError> {
        Ok(self
            .invoices
            .read()
            .await
            .values()
            .find(|i| &i.payment_id == payment_id)
            .cloned())
    }
}

/// In-memory webhook ingestion log.
#[derive(Default)]
pub struct InMemoryWebhookEventRepository {
    records: Arc<RwLock<HashMap<String, WebhookEventRecord>>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logged deliveries (test helper).
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn record_received(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.event_id) {
            Ok(SaveResult::AlreadyExists)
        } else {
            records.insert(record.event_id.clone(), record);
            Ok(SaveResult::Inserted)
        }
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        outcome: ProcessingOutcome,
    ) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(event_id)
            .ok_or_else(|| DomainError::database(format!("event {} not recorded", event_id)))?;
        record.processed = true;
        record.processed_at = Some(Utc::now());
        record.error = match outcome {
            ProcessingOutcome::Succeeded => None,
            ProcessingOutcome::Failed(error) => Some(error),
        };
        Ok(())
    }

    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(self.records.read().await.get(event_id).cloned())
    }

    async fn list_unprocessed(&self, limit: u32) -> Result<Vec<WebhookEventRecord>, DomainError> {
        let records = self.records.read().await;
        let mut unprocessed: Vec<WebhookEventRecord> = records
            .values()
            .filter(|r| !r.processed)
            .cloned()
            .collect();
        unprocessed.sort_by_key(|r| r.received_at);
        unprocessed.truncate(limit as usize);
        Ok(unprocessed)
    }

    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.received_at >= timestamp);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::PaymentStatus;
    use crate::domain::foundation::{Currency, Money, Timestamp};

    fn payment(provider_id: &str) -> Payment {
        Payment::record(
            PaymentId::new(),
            SubscriptionId::new(),
            SubscriberId::new(),
            Some(provider_id.to_string()),
            PaymentStatus::Approved,
            Money::new(9990, Currency::new("CLP").unwrap()).unwrap(),
            1,
            None,
            serde_json::json!({}),
            Timestamp::now(),
        )
    }

    #[tokio::test]
    async fn payment_insert_dedups_on_provider_id() {
        let repo = InMemoryPaymentRepository::new();

        let first = repo.insert(payment("PAY1")).await.unwrap();
        let second = repo.insert(payment("PAY1")).await.unwrap();

        assert!(first.was_inserted());
        assert!(matches!(second, PaymentInsert::Duplicate(_)));
        assert_eq!(repo.count().await, 1);
    }

    #[tokio::test]
    async fn claim_preapproval_is_first_writer_wins() {
        let repo = InMemorySubscriptionRepository::new();
        let subscription =
            Subscription::create(SubscriptionId::new(), SubscriberId::new(), PlanId::new());
        repo.save(&subscription).await.unwrap();

        let first = repo.claim_preapproval(&subscription.id, "pre_A").await.unwrap();
        let second = repo.claim_preapproval(&subscription.id, "pre_B").await.unwrap();

        assert_eq!(first, ClaimOutcome::Claimed);
        let ClaimOutcome::AlreadyClaimed(winner) = second else {
            panic!("expected AlreadyClaimed");
        };
        assert_eq!(winner.preapproval_id.as_deref(), Some("pre_A"));
    }

    #[tokio::test]
    async fn reclaiming_the_same_preapproval_id_succeeds() {
        let repo = InMemorySubscriptionRepository::new();
        let subscription =
            Subscription::create(SubscriptionId::new(), SubscriberId::new(), PlanId::new());
        repo.save(&subscription).await.unwrap();

        repo.claim_preapproval(&subscription.id, "pre_A").await.unwrap();
        let again = repo.claim_preapproval(&subscription.id, "pre_A").await.unwrap();
        assert_eq!(again, ClaimOutcome::Claimed);
    }

    #[tokio::test]
    async fn webhook_log_dedups_and_marks_processed() {
        let repo = InMemoryWebhookEventRepository::new();
        let record = WebhookEventRecord::received(
            "mercadopago",
            "payment",
            "PAY1",
            "evt_1",
            serde_json::json!({}),
        );

        assert_eq!(
            repo.record_received(record.clone()).await.unwrap(),
            SaveResult::Inserted
        );
        assert_eq!(
            repo.record_received(record).await.unwrap(),
            SaveResult::AlreadyExists
        );

        repo.mark_processed("evt_1", ProcessingOutcome::Failed("boom".to_string()))
            .await
            .unwrap();
        let stored = repo.find_by_event_id("evt_1").await.unwrap().unwrap();
        assert!(stored.processed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert!(repo.list_unprocessed(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unprocessed_listing_returns_only_unmarked_records() {
        let repo = InMemoryWebhookEventRepository::new();
        for i in 0..3 {
            repo.record_received(WebhookEventRecord::received(
                "mercadopago",
                "payment",
                format!("PAY{}", i),
                format!("evt_{}", i),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        }
        repo.mark_processed("evt_1", ProcessingOutcome::Succeeded)
            .await
            .unwrap();

        let unprocessed = repo.list_unprocessed(10).await.unwrap();
        assert_eq!(unprocessed.len(), 2);
        assert!(unprocessed.iter().all(|r| r.event_id != "evt_1"));
    }

    #[tokio::test]
    async fn invoice_insert_dedups_on_payment_id() {
        let repo = InMemoryInvoiceRepository::new();
        let payment = payment("PAY1");
        let invoice = crate::domain::billing::Invoice::for_payment(&payment, Timestamp::now());

        let first = repo.insert(invoice.clone()).await.unwrap();
        let second = repo
            .insert(crate::domain::billing::Invoice::for_payment(
                &payment,
                Timestamp::now(),
            ))
            .await
            .unwrap();

        assert!(matches!(first, InvoiceInsert::Inserted(_)));
        assert!(matches!(second, InvoiceInsert::AlreadyExists(_)));
        assert_eq!(repo.count().await, 1);
    }
}
