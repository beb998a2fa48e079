use crate::config::ConfigError;
use crate::notify::NotifyError;
use crate::payments::PaymentError;
use crate::storage::StoreError;
use crate::telemetry::TelemetryError;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Store(StoreError),
    Payment(PaymentError),
    Notify(NotifyError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Store(err) => write!(f, "storage error: {}", err),
            AppError::Payment(err) => write!(f, "payment processor error: {}", err),
            AppError::Notify(err) => write!(f, "mail error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Payment(err) => Some(err),
            AppError::Notify(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<PaymentError> for AppError {
    fn from(value: PaymentError) -> Self {
        Self::Payment(value)
    }
}

impl From<NotifyError> for AppError {
    fn from(value: NotifyError) -> Self {
        Self::Notify(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outdated_schema_points_at_the_migrate_command() {
        let err = AppError::from(StoreError::SchemaOutdated {
            found: 1,
            expected: 2,
        });
        assert_eq!(
            err.to_string(),
            "storage error: database schema is at version 1, expected 2; run the migrate command"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn missing_credentials_render_the_variable_name() {
        let err = AppError::from(ConfigError::Missing("SMTP_PASSWORD"));
        assert_eq!(
            err.to_string(),
            "configuration error: SMTP_PASSWORD is required but not set"
        );
    }
}
