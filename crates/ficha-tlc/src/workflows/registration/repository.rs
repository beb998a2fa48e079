use std::sync::Arc;

use super::domain::{NewRegistration, PaymentUpdate, RegistrationId, RegistrationRecord};

/// Storage abstraction so the intake and reconciliation services can be
/// exercised without a database.
pub trait RegistrationRepository: Send + Sync {
    /// Persists a registration and its guardians, assigning a fresh id.
    fn insert(&self, registration: NewRegistration)
        -> Result<RegistrationRecord, RepositoryError>;

    fn fetch(&self, id: RegistrationId) -> Result<Option<RegistrationRecord>, RepositoryError>;

    fn find_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<RegistrationRecord>, RepositoryError>;

    /// Overwrites the payment fields of one record in a single atomic write.
    /// Returns `None` when no record has that id.
    fn record_payment(
        &self,
        id: RegistrationId,
        update: &PaymentUpdate,
    ) -> Result<Option<RegistrationRecord>, RepositoryError>;

    /// Newest registration that has not been matched to any payment yet.
    /// Only used by the legacy correlation policy.
    fn latest_without_payment(&self) -> Result<Option<RegistrationRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("registration is missing {0}")]
    Incomplete(&'static str),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Runs a repository call on the blocking pool; stores may wait on disk or on
/// a connection lock.
pub(crate) async fn run_blocking<R, T, F>(
    repository: &Arc<R>,
    call: F,
) -> Result<T, RepositoryError>
where
    R: RegistrationRepository + 'static,
    T: Send + 'static,
    F: FnOnce(&R) -> Result<T, RepositoryError> + Send + 'static,
{
    let repository = Arc::clone(repository);
    tokio::task::spawn_blocking(move || call(repository.as_ref()))
        .await
        .map_err(|err| RepositoryError::Unavailable(format!("repository task failed: {err}")))?
}
