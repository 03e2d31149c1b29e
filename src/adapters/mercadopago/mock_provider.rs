//! Mock payment provider for tests and local development.
//!
//! Reproduces the provider behaviors the reconciliation core depends on:
//! preapproval creation is deduplicated by idempotency key (retried
//! requests resolve to the same resource), and seeded payments /
//! preapprovals answer the lookup calls webhook processing makes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ports::{
    CreatePreapprovalRequest, CreatePreferenceRequest, PaymentProvider, Preapproval,
    PreapprovalStatus, Preference, ProviderError, ProviderPayment,
};

/// In-process mock of the payment provider.
pub struct MockPaymentProvider {
    /// Preapprovals created or seeded, by id.
    preapprovals: Mutex<HashMap<String, Preapproval>>,
    /// Idempotency-key dedup map: key -> preapproval id.
    preapprovals_by_key: Mutex<HashMap<String, String>>,
    /// Preferences created, by idempotency key.
    preferences_by_key: Mutex<HashMap<String, Preference>>,
    /// Seeded payments, by id.
    payments: Mutex<HashMap<String, ProviderPayment>>,
    /// Monotonic id source.
    next_id: AtomicU64,
    /// When true, every call fails with a network error.
    fail_all: bool,
}

impl Default for MockPaymentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self {
            preapprovals: Mutex::new(HashMap::new()),
            preapprovals_by_key: Mutex::new(HashMap::new()),
            preferences_by_key: Mutex::new(HashMap::new()),
            payments: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            fail_all: false,
        }
    }

    /// A provider where every call fails with a retryable network error.
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::new()
        }
    }

    /// Seeds a preapproval with a generated id; returns the id.
    pub fn seed_preapproval(&self, status: &str) -> String {
        let id = format!("pre_{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.seed_preapproval_with_id(&id, status);
        id
    }

    /// Seeds a preapproval under a fixed id.
    pub fn seed_preapproval_with_id(&self, id: &str, status: &str) {
        self.preapprovals.lock().unwrap().insert(
            id.to_string(),
            Preapproval {
                id: id.to_string(),
                init_point: format!("https://provider.test/checkout/{}", id),
                status: PreapprovalStatus::from_provider(status),
                external_reference: None,
            },
        );
    }

    /// Seeds a payment the webhook path can fetch.
    pub fn seed_payment(&self, payment: ProviderPayment) {
        self.payments
            .lock()
            .unwrap()
            .insert(payment.id.clone(), payment);
    }

    /// Number of distinct preapprovals ever created (test assertion hook).
    pub fn preapproval_count(&self) -> usize {
        self.preapprovals.lock().unwrap().len()
    }

    /// True if the preapproval is cancelled provider-side.
    pub fn preapproval_cancelled(&self, id: &str) -> bool {
        self.preapprovals
            .lock()
            .unwrap()
            .get(id)
            .map(|p| p.status == PreapprovalStatus::Cancelled)
            .unwrap_or(false)
    }

    fn gate(&self) -> Result<(), ProviderError> {
        if self.fail_all {
            Err(ProviderError::network("simulated connection failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_preapproval(
        &self,
        request: CreatePreapprovalRequest,
    ) -> Result<Preapproval, ProviderError> {
        self.gate()?;

        // Provider-side idempotency: a retried request with the same key
        // returns the original resource.
        let mut by_key = self.preapprovals_by_key.lock().unwrap();
        if let Some(existing_id) = by_key.get(&request.idempotency_key) {
            let preapprovals = self.preapprovals.lock().unwrap();
            return Ok(preapprovals
                .get(existing_id)
                .cloned()
                .expect("dedup map points at a stored preapproval"));
        }

        let id = format!("pre_{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let preapproval = Preapproval {
            id: id.clone(),
            init_point: format!("https://provider.test/checkout/{}", id),
            status: PreapprovalStatus::Pending,
            external_reference: Some(request.external_reference),
        };
        self.preapprovals
            .lock()
            .unwrap()
            .insert(id.clone(), preapproval.clone());
        by_key.insert(request.idempotency_key, id);
        Ok(preapproval)
    }

    async fn get_preapproval(
        &self,
        preapproval_id: &str,
    ) -> Result<Option<Preapproval>, ProviderError> {
        self.gate()?;
        Ok(self.preapprovals.lock().unwrap().get(preapproval_id).cloned())
    }

    async fn cancel_preapproval(&self, preapproval_id: &str) -> Result<Preapproval, ProviderError> {
        self.gate()?;
        let mut preapprovals = self.preapprovals.lock().unwrap();
        let preapproval = preapprovals
            .get_mut(preapproval_id)
            .ok_or_else(|| ProviderError::api(format!("preapproval {} not found", preapproval_id)))?;
        preapproval.status = PreapprovalStatus::Cancelled;
        Ok(preapproval.clone())
    }

    async fn create_preference(
        &self,
        request: CreatePreferenceRequest,
    ) -> Result<Preference, ProviderError> {
        self.gate()?;

        let mut by_key = self.preferences_by_key.lock().unwrap();
        if let Some(existing) = by_key.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        let id = format!("pref_{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let preference = Preference {
            init_point: format!("https://provider.test/pay/{}", id),
            id,
        };
        by_key.insert(request.idempotency_key, preference.clone());
        Ok(preference)
    }

    async fn get_payment(&self, payment_id: &str) -> Result<Option<ProviderPayment>, ProviderError> {
        self.gate()?;
        Ok(self.payments.lock().unwrap().get(payment_id).cloned())
    }
}
