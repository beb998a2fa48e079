//! Confirmation messages sent once a registration's payment is approved.

pub mod smtp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflows::registration::{RegistrationId, RegistrationRecord};

pub use smtp::SmtpNotifier;

/// Plain-text confirmation addressed to the configured recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationMessage {
    pub registration_id: RegistrationId,
    pub name: String,
    pub phone: String,
    pub payment_id: Option<String>,
}

impl ConfirmationMessage {
    pub fn for_record(record: &RegistrationRecord) -> Self {
        Self {
            registration_id: record.id,
            name: record.registration.name.clone(),
            phone: record.registration.phone.clone(),
            payment_id: record.payment_id.clone(),
        }
    }

    pub fn subject(&self) -> String {
        format!("Inscrição TLC confirmada: {}", self.name)
    }

    pub fn body(&self) -> String {
        let mut body = format!(
            "Pagamento aprovado para uma nova inscrição.\n\n\
             Inscrição: {}\nNome: {}\nTelefone: {}\n",
            self.registration_id, self.name, self.phone
        );
        if let Some(payment_id) = &self.payment_id {
            body.push_str(&format!("Pagamento: {payment_id}\n"));
        }
        body
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid mail address: {0}")]
    Address(String),
    #[error("could not build message: {0}")]
    Message(String),
    #[error("mail transport unavailable: {0}")]
    Transport(String),
}

/// Outbound port for confirmation delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation(&self, message: &ConfirmationMessage) -> Result<(), NotifyError>;
}
