use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::config::CorrelationPolicy;
use crate::notify::{ConfirmationMessage, NotifyError, Notifier};
use crate::payments::{
    BackUrls, CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway, ProcessorPayment,
    RetryPolicy,
};
use crate::workflows::registration::{
    registration_router, CheckoutSettings, IntakeService, NewRegistration, PaymentStatus,
    PaymentUpdate, ReconciliationService, ReconciliationSettings, RegistrationForm,
    RegistrationId, RegistrationRecord, RegistrationRepository, RegistrationState,
    RepositoryError,
};

#[derive(Default)]
pub(super) struct MemoryRepository {
    records: Mutex<Vec<RegistrationRecord>>,
    sequence: AtomicI64,
    threads: Mutex<Vec<ThreadId>>,
}

impl MemoryRepository {
    pub(super) fn all(&self) -> Vec<RegistrationRecord> {
        self.records.lock().expect("repository mutex poisoned").clone()
    }

    /// Threads that ran the writes and lookups issued by the services.
    pub(super) fn calling_threads(&self) -> Vec<ThreadId> {
        self.threads.lock().expect("repository mutex poisoned").clone()
    }

    fn note_thread(&self) {
        self.threads
            .lock()
            .expect("repository mutex poisoned")
            .push(std::thread::current().id());
    }

    pub(super) fn get(&self, id: RegistrationId) -> RegistrationRecord {
        self.fetch(id)
            .expect("fetch succeeds")
            .expect("record present")
    }
}

impl RegistrationRepository for MemoryRepository {
    fn insert(
        &self,
        registration: NewRegistration,
    ) -> Result<RegistrationRecord, RepositoryError> {
        self.note_thread();
        let id = RegistrationId(self.sequence.fetch_add(1, Ordering::SeqCst) + 1);
        let record = RegistrationRecord {
            id,
            registration,
            created_at: Utc::now(),
            payment_id: None,
            payment_status: None,
            payment_updated_at: None,
        };
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .push(record.clone());
        Ok(record)
    }

    fn fetch(&self, id: RegistrationId) -> Result<Option<RegistrationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.iter().find(|record| record.id == id).cloned())
    }

    fn find_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<RegistrationRecord>, RepositoryError> {
        self.note_thread();
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .iter()
            .find(|record| record.payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    fn record_payment(
        &self,
        id: RegistrationId,
        update: &PaymentUpdate,
    ) -> Result<Option<RegistrationRecord>, RepositoryError> {
        self.note_thread();
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.iter_mut().find(|record| record.id == id).map(|record| {
            record.payment_id = Some(update.payment_id.clone());
            record.payment_status = Some(update.status.clone());
            record.payment_updated_at = Some(Utc::now());
            record.clone()
        }))
    }

    fn latest_without_payment(&self) -> Result<Option<RegistrationRecord>, RepositoryError> {
        self.note_thread();
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .iter()
            .rev()
            .find(|record| record.payment_id.is_none())
            .cloned())
    }
}

pub(super) struct UnavailableRepository;

impl RegistrationRepository for UnavailableRepository {
    fn insert(
        &self,
        _registration: NewRegistration,
    ) -> Result<RegistrationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: RegistrationId) -> Result<Option<RegistrationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_payment_id(
        &self,
        _payment_id: &str,
    ) -> Result<Option<RegistrationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn record_payment(
        &self,
        _id: RegistrationId,
        _update: &PaymentUpdate,
    ) -> Result<Option<RegistrationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn latest_without_payment(&self) -> Result<Option<RegistrationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Processor double: records checkout requests and serves canned payments.
#[derive(Default)]
pub(super) struct StubGateway {
    checkouts: Mutex<Vec<CheckoutRequest>>,
    payments: Mutex<HashMap<String, ProcessorPayment>>,
    reject_checkout: AtomicBool,
}

impl StubGateway {
    pub(super) fn checkouts(&self) -> Vec<CheckoutRequest> {
        self.checkouts.lock().expect("gateway mutex poisoned").clone()
    }

    pub(super) fn reject_checkouts(&self) {
        self.reject_checkout.store(true, Ordering::SeqCst);
    }

    pub(super) fn report(&self, payment_id: &str, status: &str, reference: Option<&str>) {
        self.payments.lock().expect("gateway mutex poisoned").insert(
            payment_id.to_string(),
            ProcessorPayment {
                id: payment_id.to_string(),
                status: PaymentStatus::from(status),
                external_reference: reference.map(str::to_string),
            },
        );
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        if self.reject_checkout.load(Ordering::SeqCst) {
            return Err(PaymentError::Rejected {
                status: 400,
                body: "invalid unit_price".to_string(),
            });
        }
        self.checkouts
            .lock()
            .expect("gateway mutex poisoned")
            .push(request.clone());
        Ok(CheckoutSession {
            id: format!("pref-{}", request.external_reference),
            init_point: format!(
                "https://checkout.example/pay?pref_id=pref-{}",
                request.external_reference
            ),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<ProcessorPayment, PaymentError> {
        self.payments
            .lock()
            .expect("gateway mutex poisoned")
            .get(payment_id)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(payment_id.to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    sent: Mutex<Vec<ConfirmationMessage>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub(super) fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        notifier
    }

    pub(super) fn sent(&self) -> Vec<ConfirmationMessage> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

/// Notifier whose relay never answers within the configured timeout.
pub(super) struct StalledNotifier {
    pub(super) delay: Duration,
}

#[async_trait]
impl Notifier for StalledNotifier {
    async fn send_confirmation(&self, _message: &ConfirmationMessage) -> Result<(), NotifyError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send_confirmation(&self, message: &ConfirmationMessage) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(message.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("relay refused".to_string()));
        }
        Ok(())
    }
}

pub(super) fn checkout_settings() -> CheckoutSettings {
    CheckoutSettings {
        item_title: "Inscrição TLC 2025".to_string(),
        unit_price: dec!(100.00),
        back_urls: BackUrls {
            success: "https://ficha.example/obrigado".to_string(),
            failure: "https://ficha.example/".to_string(),
            pending: "https://ficha.example/".to_string(),
        },
        notification_url: Some("https://ficha.example/webhook".to_string()),
    }
}

pub(super) fn reconciliation_settings(correlation: CorrelationPolicy) -> ReconciliationSettings {
    ReconciliationSettings {
        correlation,
        lookup_retry: RetryPolicy::none(),
        notify_timeout: Duration::from_secs(1),
    }
}

pub(super) fn form(pairs: &[(&str, &str)]) -> RegistrationForm {
    RegistrationForm::from(
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<Vec<_>>(),
    )
}

pub(super) struct Harness<N = MemoryNotifier> {
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) gateway: Arc<StubGateway>,
    pub(super) notifier: Arc<N>,
    pub(super) intake: Arc<IntakeService<MemoryRepository, StubGateway>>,
    pub(super) reconciliation: Arc<ReconciliationService<MemoryRepository, StubGateway, N>>,
}

impl<N: Notifier + 'static> Harness<N> {
    pub(super) fn router(&self) -> axum::Router {
        registration_router(RegistrationState {
            intake: Arc::clone(&self.intake),
            reconciliation: Arc::clone(&self.reconciliation),
        })
    }
}

pub(super) fn harness() -> Harness {
    harness_with(MemoryNotifier::default(), CorrelationPolicy::Strict)
}

pub(super) fn harness_with<N: Notifier + 'static>(
    notifier: N,
    correlation: CorrelationPolicy,
) -> Harness<N> {
    harness_with_settings(notifier, reconciliation_settings(correlation))
}

pub(super) fn harness_with_settings<N: Notifier + 'static>(
    notifier: N,
    settings: ReconciliationSettings,
) -> Harness<N> {
    let repository = Arc::new(MemoryRepository::default());
    let gateway = Arc::new(StubGateway::default());
    let notifier = Arc::new(notifier);
    let intake = Arc::new(IntakeService::new(
        Arc::clone(&repository),
        Arc::clone(&gateway),
        checkout_settings(),
    ));
    let reconciliation = Arc::new(ReconciliationService::new(
        Arc::clone(&repository),
        Arc::clone(&gateway),
        Arc::clone(&notifier),
        settings,
    ));

    Harness {
        repository,
        gateway,
        notifier,
        intake,
        reconciliation,
    }
}

pub(super) async fn read_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body")
        .to_vec()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    serde_json::from_slice(&read_body(response).await).expect("json payload")
}
