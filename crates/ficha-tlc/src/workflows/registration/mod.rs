//! Registration intake and payment reconciliation.
//!
//! Intake stores a submission and opens a checkout session whose external
//! reference is the new registration id; reconciliation later maps processor
//! notifications back onto that record through the same reference.

pub mod domain;
pub mod form;
pub mod intake;
pub(crate) mod pages;
pub mod reconciliation;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

pub use domain::{
    Guardian, HealthDisclosures, NewRegistration, PaymentStatus, PaymentUpdate, RegistrationId,
    RegistrationRecord, Sacraments,
};
pub use form::{FormError, RegistrationForm};
pub use intake::{CheckoutSettings, IntakeError, IntakeReceipt, IntakeService};
pub use reconciliation::{
    Notification, ReconciliationError, ReconciliationOutcome, ReconciliationService,
    ReconciliationSettings,
};
pub use repository::{RegistrationRepository, RepositoryError};
pub use router::{registration_router, RegistrationState};
