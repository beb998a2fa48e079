//! SQLite persistence for registrations.
//!
//! Schema changes are applied by [`SqliteStore::migrate`], which the `migrate`
//! subcommand runs ahead of deployment; the server only checks that the
//! schema is current.

mod migrations;
mod sqlite;

pub use migrations::SCHEMA_VERSION;
pub use sqlite::SqliteStore;

use crate::workflows::registration::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("database schema is at version {found}, expected {expected}; run the migrate command")]
    SchemaOutdated { found: i64, expected: i64 },
    #[error("database schema version {0} is newer than this build supports")]
    SchemaTooNew(i64),
    #[error("store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for RepositoryError {
    fn from(value: StoreError) -> Self {
        RepositoryError::Unavailable(value.to_string())
    }
}
