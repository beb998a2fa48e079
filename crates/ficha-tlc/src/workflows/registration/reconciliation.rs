//! Applies processor payment notifications to stored registrations.
//!
//! A notification only names a payment; the processor is always asked for
//! the authoritative status, and the echoed external reference is the sole
//! link back to a registration under the strict policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::domain::{PaymentStatus, PaymentUpdate, RegistrationId, RegistrationRecord};
use super::repository::{run_blocking, RegistrationRepository, RepositoryError};
use crate::config::CorrelationPolicy;
use crate::notify::{ConfirmationMessage, Notifier};
use crate::payments::mercadopago::scalar_to_string;
use crate::payments::{fetch_payment_with_retry, PaymentError, PaymentGateway, RetryPolicy};

const PAYMENT_EVENT: &str = "payment";

/// Event type and payment id pulled out of an inbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event_type: Option<String>,
    pub payment_id: Option<String>,
}

impl Notification {
    /// Reads a JSON webhook body. The event type comes from `type`, falling
    /// back to `topic`; the payment id from `data.id`, falling back to `id`.
    pub fn from_json(body: &[u8]) -> Result<Self, ReconciliationError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|err| ReconciliationError::Malformed(err.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| ReconciliationError::Malformed("expected a JSON object".to_string()))?;

        let event_type = ["type", "topic"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_str))
            .map(|raw| raw.trim().to_ascii_lowercase());
        let payment_id = object
            .get("data")
            .and_then(|data| data.get("id"))
            .and_then(scalar_to_string)
            .or_else(|| object.get("id").and_then(scalar_to_string));

        Ok(Self {
            event_type,
            payment_id,
        })
    }

    /// Reads the query-string form (`?topic=payment&id=123`) some processor
    /// integrations still deliver with an empty body.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| params.get(*key))
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        Self {
            event_type: pick(&["type", "topic"]).map(|raw| raw.to_ascii_lowercase()),
            payment_id: pick(&["data.id", "id"]),
        }
    }

    /// Fills fields the body left out from the query string. Legacy IPN posts
    /// `?topic=payment&id=123` alongside a body that only names a resource.
    pub fn or_query(self, params: &HashMap<String, String>) -> Self {
        let query = Self::from_query(params);
        Self {
            event_type: self.event_type.or(query.event_type),
            payment_id: self.payment_id.or(query.payment_id),
        }
    }

    pub fn is_payment_event(&self) -> bool {
        self.event_type.as_deref() == Some(PAYMENT_EVENT)
    }
}

/// Processor ids are numeric today; anything outside this alphabet never
/// reaches an outbound request.
fn is_payment_id(raw: &str) -> bool {
    !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// What a notification did. Every variant is acknowledged with a success
/// response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    Ignored {
        event_type: Option<String>,
    },
    Unmatched {
        payment_id: String,
        external_reference: Option<String>,
    },
    Updated {
        registration_id: RegistrationId,
        payment_id: String,
        payment_status: PaymentStatus,
        notified: bool,
    },
}

/// Error raised while reconciling a notification.
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error("malformed notification: {0}")]
    Malformed(String),
    #[error("payment {0} is unknown to the processor")]
    PaymentNotFound(String),
    #[error(transparent)]
    Payment(PaymentError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<PaymentError> for ReconciliationError {
    fn from(value: PaymentError) -> Self {
        match value {
            PaymentError::NotFound(payment_id) => Self::PaymentNotFound(payment_id),
            other => Self::Payment(other),
        }
    }
}

/// Tunables for [`ReconciliationService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationSettings {
    pub correlation: CorrelationPolicy,
    pub lookup_retry: RetryPolicy,
    pub notify_timeout: Duration,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            correlation: CorrelationPolicy::Strict,
            lookup_retry: RetryPolicy::default(),
            notify_timeout: Duration::from_secs(10),
        }
    }
}

pub struct ReconciliationService<R, G, N> {
    repository: Arc<R>,
    gateway: Arc<G>,
    notifier: Arc<N>,
    settings: ReconciliationSettings,
}

impl<R, G, N> ReconciliationService<R, G, N>
where
    R: RegistrationRepository + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        gateway: Arc<G>,
        notifier: Arc<N>,
        settings: ReconciliationSettings,
    ) -> Self {
        Self {
            repository,
            gateway,
            notifier,
            settings,
        }
    }

    pub async fn reconcile(
        &self,
        notification: Notification,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        if !notification.is_payment_event() {
            info!(event_type = ?notification.event_type, "ignoring non-payment notification");
            return Ok(ReconciliationOutcome::Ignored {
                event_type: notification.event_type,
            });
        }

        let payment_id = notification.payment_id.ok_or_else(|| {
            ReconciliationError::Malformed("payment notification without an id".to_string())
        })?;
        if !is_payment_id(&payment_id) {
            return Err(ReconciliationError::Malformed(format!(
                "payment id {payment_id:?} has unexpected characters"
            )));
        }

        let payment = fetch_payment_with_retry(
            self.gateway.as_ref(),
            &payment_id,
            self.settings.lookup_retry,
        )
        .await?;

        let Some(target) = self.resolve(payment.external_reference.as_deref()).await? else {
            warn!(
                %payment_id,
                external_reference = ?payment.external_reference,
                "payment does not correlate to any registration"
            );
            return Ok(ReconciliationOutcome::Unmatched {
                payment_id,
                external_reference: payment.external_reference,
            });
        };

        let lookup = payment_id.clone();
        let previous =
            run_blocking(&self.repository, move |repo| repo.find_by_payment_id(&lookup)).await?;
        if let Some(previous) = previous {
            if previous.id != target {
                warn!(
                    %payment_id,
                    previous = %previous.id,
                    registration_id = %target,
                    "payment already recorded on another registration"
                );
            }
        }

        let update = PaymentUpdate {
            payment_id: payment_id.clone(),
            status: payment.status,
        };
        let write = update.clone();
        let recorded =
            run_blocking(&self.repository, move |repo| repo.record_payment(target, &write)).await?;
        let Some(record) = recorded else {
            warn!(%payment_id, registration_id = %target, "referenced registration does not exist");
            return Ok(ReconciliationOutcome::Unmatched {
                payment_id,
                external_reference: payment.external_reference,
            });
        };
        info!(registration_id = %record.id, %payment_id, status = %update.status, "payment recorded");

        let notified = if update.status.is_approved() {
            self.notify(&record).await
        } else {
            false
        };

        Ok(ReconciliationOutcome::Updated {
            registration_id: record.id,
            payment_id,
            payment_status: update.status,
            notified,
        })
    }

    async fn resolve(
        &self,
        external_reference: Option<&str>,
    ) -> Result<Option<RegistrationId>, RepositoryError> {
        if let Some(reference) = external_reference {
            return Ok(RegistrationId::from_external_reference(reference));
        }

        match self.settings.correlation {
            CorrelationPolicy::Strict => Ok(None),
            CorrelationPolicy::LegacyLatestUnpaid => {
                let fallback =
                    run_blocking(&self.repository, |repo| repo.latest_without_payment()).await?;
                if let Some(record) = &fallback {
                    warn!(registration_id = %record.id, "no external reference, guessing newest unpaid registration");
                }
                Ok(fallback.map(|record| record.id))
            }
        }
    }

    /// Best effort: failures and timeouts are logged and never propagated.
    async fn notify(&self, record: &RegistrationRecord) -> bool {
        let message = ConfirmationMessage::for_record(record);
        let send = self.notifier.send_confirmation(&message);
        match tokio::time::timeout(self.settings.notify_timeout, send).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(registration_id = %record.id, error = %err, "confirmation mail failed");
                false
            }
            Err(_) => {
                warn!(registration_id = %record.id, "confirmation mail timed out");
                false
            }
        }
    }
}
