use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned registration identifier, also used as the checkout
/// external reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(pub i64);

impl RegistrationId {
    /// Renders the id as the opaque reference handed to the processor.
    pub fn external_reference(&self) -> String {
        self.0.to_string()
    }

    /// Parses an echoed external reference. Anything other than a positive
    /// decimal integer is rejected rather than guessed at.
    pub fn from_external_reference(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        trimmed.parse::<i64>().ok().filter(|id| *id > 0).map(Self)
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Guardian contact submitted alongside a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// Care-related disclosures. `Some(detail)` means the applicant answered yes;
/// the detail may be empty when nothing was written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthDisclosures {
    pub controlled_medication: Option<String>,
    pub mobility_impairment: Option<String>,
    pub mental_health_condition: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sacraments {
    pub baptism: bool,
    pub first_communion: bool,
    pub confirmation: bool,
}

/// Validated submission, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRegistration {
    pub name: String,
    pub phone: String,
    pub address: Option<String>,
    pub guardians: Vec<Guardian>,
    pub health: HealthDisclosures,
    pub sacraments: Sacraments,
}

impl NewRegistration {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            address: None,
            guardians: Vec::new(),
            health: HealthDisclosures::default(),
            sacraments: Sacraments::default(),
        }
    }
}

/// Payment status vocabulary reported by Mercado Pago. Unknown values are
/// preserved verbatim so a new processor status never fails reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    Pending,
    Approved,
    Authorized,
    InProcess,
    InMediation,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
    Other(String),
}

impl PaymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::InProcess => "in_process",
            PaymentStatus::InMediation => "in_mediation",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::ChargedBack => "charged_back",
            PaymentStatus::Other(raw) => raw.as_str(),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, PaymentStatus::Approved)
    }
}

impl FromStr for PaymentStatus {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => PaymentStatus::Pending,
            "approved" => PaymentStatus::Approved,
            "authorized" => PaymentStatus::Authorized,
            "in_process" => PaymentStatus::InProcess,
            "in_mediation" => PaymentStatus::InMediation,
            "rejected" => PaymentStatus::Rejected,
            "cancelled" => PaymentStatus::Cancelled,
            "refunded" => PaymentStatus::Refunded,
            "charged_back" => PaymentStatus::ChargedBack,
            _ => PaymentStatus::Other(raw.trim().to_string()),
        })
    }
}

impl From<&str> for PaymentStatus {
    fn from(raw: &str) -> Self {
        match raw.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PaymentStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PaymentStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(PaymentStatus::from(raw.as_str()))
    }
}

/// Payment fields written by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub payment_id: String,
    pub status: PaymentStatus,
}

/// Persisted registration, including payment state once a notification
/// has resolved to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub id: RegistrationId,
    pub registration: NewRegistration,
    pub created_at: DateTime<Utc>,
    pub payment_id: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_updated_at: Option<DateTime<Utc>>,
}

impl RegistrationRecord {
    pub fn status_label(&self) -> &str {
        self.payment_status
            .as_ref()
            .map(PaymentStatus::as_str)
            .unwrap_or("unset")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_reference_requires_a_positive_integer() {
        assert_eq!(
            RegistrationId::from_external_reference(" 42 "),
            Some(RegistrationId(42))
        );
        assert_eq!(RegistrationId::from_external_reference(""), None);
        assert_eq!(RegistrationId::from_external_reference("0"), None);
        assert_eq!(RegistrationId::from_external_reference("-3"), None);
        assert_eq!(RegistrationId::from_external_reference("12abc"), None);
        assert_eq!(
            RegistrationId::from_external_reference("99999999999999999999"),
            None
        );
    }

    #[test]
    fn unknown_statuses_are_preserved() {
        let status = PaymentStatus::from("expired");
        assert_eq!(status, PaymentStatus::Other("expired".to_string()));
        assert_eq!(status.as_str(), "expired");
        assert!(!status.is_approved());
        assert!(PaymentStatus::from("APPROVED").is_approved());
    }
}
