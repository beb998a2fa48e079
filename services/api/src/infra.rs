use ficha_tlc::config::AppConfig;
use ficha_tlc::error::AppError;
use ficha_tlc::notify::SmtpNotifier;
use ficha_tlc::payments::{MercadoPagoClient, RetryPolicy};
use ficha_tlc::storage::SqliteStore;
use ficha_tlc::workflows::registration::{
    CheckoutSettings, IntakeService, ReconciliationService, ReconciliationSettings,
    RegistrationState,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type LiveRegistrationState =
    RegistrationState<SqliteStore, MercadoPagoClient, SmtpNotifier>;

/// Opens the store and builds the outbound clients. Refuses to continue
/// against a database that has not been migrated.
pub(crate) fn registration_services(
    config: &AppConfig,
) -> Result<LiveRegistrationState, AppError> {
    let store = SqliteStore::open(&config.database.path)?;
    store.ensure_migrated()?;
    let store = Arc::new(store);

    let gateway = Arc::new(MercadoPagoClient::new(&config.payment)?);
    let notifier = Arc::new(SmtpNotifier::new(&config.mail)?);

    let intake = IntakeService::new(
        Arc::clone(&store),
        Arc::clone(&gateway),
        CheckoutSettings::from(&config.checkout),
    );
    let reconciliation = ReconciliationService::new(
        store,
        gateway,
        notifier,
        reconciliation_settings(config),
    );

    Ok(RegistrationState {
        intake: Arc::new(intake),
        reconciliation: Arc::new(reconciliation),
    })
}

fn reconciliation_settings(config: &AppConfig) -> ReconciliationSettings {
    ReconciliationSettings {
        correlation: config.checkout.correlation,
        lookup_retry: RetryPolicy {
            attempts: config.payment.lookup_attempts,
            base_delay: Duration::from_millis(250),
        },
        notify_timeout: config.mail.timeout,
    }
}
