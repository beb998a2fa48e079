use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use super::domain::RegistrationRecord;
use super::form::{FormError, RegistrationForm};
use super::repository::{run_blocking, RegistrationRepository, RepositoryError};
use crate::config::CheckoutConfig;
use crate::payments::{
    BackUrls, CheckoutItem, CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway,
};

/// Fixed checkout parameters shared by every submission.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSettings {
    pub item_title: String,
    pub unit_price: Decimal,
    pub back_urls: BackUrls,
    pub notification_url: Option<String>,
}

impl From<&CheckoutConfig> for CheckoutSettings {
    fn from(config: &CheckoutConfig) -> Self {
        Self {
            item_title: config.item_title.clone(),
            unit_price: config.unit_price,
            back_urls: BackUrls {
                success: config.success_url(),
                failure: config.retry_url(),
                pending: config.retry_url(),
            },
            notification_url: Some(config.notification_url()),
        }
    }
}

impl CheckoutSettings {
    fn request_for(&self, record: &RegistrationRecord) -> CheckoutRequest {
        CheckoutRequest {
            items: vec![CheckoutItem {
                title: self.item_title.clone(),
                quantity: 1,
                unit_price: self.unit_price,
            }],
            back_urls: self.back_urls.clone(),
            auto_return: "approved".to_string(),
            external_reference: record.id.external_reference(),
            notification_url: self.notification_url.clone(),
        }
    }
}

/// Stored registration plus the checkout session the visitor is sent to.
#[derive(Debug, Clone)]
pub struct IntakeReceipt {
    pub record: RegistrationRecord,
    pub session: CheckoutSession,
}

impl IntakeReceipt {
    pub fn redirect_url(&self) -> &str {
        &self.session.init_point
    }
}

/// Validates a submission, stores it and opens a checkout session for it.
pub struct IntakeService<R, G> {
    repository: Arc<R>,
    gateway: Arc<G>,
    checkout: CheckoutSettings,
}

impl<R, G> IntakeService<R, G>
where
    R: RegistrationRepository + 'static,
    G: PaymentGateway + 'static,
{
    pub fn new(repository: Arc<R>, gateway: Arc<G>, checkout: CheckoutSettings) -> Self {
        Self {
            repository,
            gateway,
            checkout,
        }
    }

    pub async fn submit(&self, form: RegistrationForm) -> Result<IntakeReceipt, IntakeError> {
        let registration = form.into_registration()?;
        let record = run_blocking(&self.repository, move |repo| repo.insert(registration)).await?;
        info!(registration_id = %record.id, guardians = record.registration.guardians.len(), "registration stored");

        let request = self.checkout.request_for(&record);
        let session = self.gateway.create_checkout(&request).await?;
        if session.init_point.trim().is_empty() {
            return Err(IntakeError::Payment(PaymentError::Decode(
                "checkout session has no entry url".to_string(),
            )));
        }
        info!(registration_id = %record.id, preference_id = %session.id, "checkout session opened");

        Ok(IntakeReceipt { record, session })
    }
}

/// Error raised while accepting a submission.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}
