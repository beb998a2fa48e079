use rust_decimal::Decimal;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// How a payment notification is mapped back to a stored registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrelationPolicy {
    /// The echoed external reference must parse as a registration id.
    #[default]
    Strict,
    /// Falls back to the newest registration without a payment id when the
    /// reference is missing. Misattributes payments under concurrent
    /// submissions; kept only for deployments migrating off the old form.
    LegacyLatestUnpaid,
}

impl CorrelationPolicy {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "legacy-latest-unpaid" | "legacy" => Ok(Self::LegacyLatestUnpaid),
            _ => Err(ConfigError::Invalid {
                key: "RECONCILE_CORRELATION",
                reason: "expected 'strict' or 'legacy-latest-unpaid'",
            }),
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub database: DatabaseConfig,
    pub payment: PaymentConfig,
    pub mail: MailConfig,
    pub checkout: CheckoutConfig,
}

impl AppConfig {
    /// Loads every section, failing on the first missing credential.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        Ok(Self {
            environment,
            server: ServerConfig::from_env()?,
            telemetry: TelemetryConfig::from_env(),
            database: DatabaseConfig::from_env()?,
            payment: PaymentConfig::from_env()?,
            mail: MailConfig::from_env()?,
            checkout: CheckoutConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        // Hosting platforms inject PORT; APP_PORT wins when both are set.
        let port = env::var("APP_PORT")
            .or_else(|_| env::var("PORT"))
            .unwrap_or_else(|_| "10000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        Ok(Self { host, port })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        Self { log_level }
    }
}

/// Location of the SQLite database holding registrations.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(Self {
            path: PathBuf::from(required("DATABASE_PATH")?),
        })
    }
}

/// Mercado Pago API access.
#[derive(Clone)]
pub struct PaymentConfig {
    pub access_token: String,
    pub api_base: String,
    pub lookup_attempts: u32,
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let access_token = required("MERCADOPAGO_ACCESS_TOKEN")?;
        let api_base = env::var("MERCADOPAGO_API_BASE")
            .unwrap_or_else(|_| "https://api.mercadopago.com".to_string());
        let lookup_attempts = optional_parse("PAYMENT_LOOKUP_ATTEMPTS", 3u32)?.max(1);

        Ok(Self {
            access_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            lookup_attempts,
        })
    }
}

impl fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("access_token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("lookup_attempts", &self.lookup_attempts)
            .finish()
    }
}

/// SMTP relay and confirmation recipient.
#[derive(Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub recipient: String,
    pub timeout: Duration,
}

impl MailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let username = required("SMTP_USERNAME")?;
        let password = required("SMTP_PASSWORD")?;
        let recipient = required("MAIL_RECIPIENT")?;
        let from = env::var("MAIL_FROM").unwrap_or_else(|_| username.clone());

        Ok(Self {
            smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            smtp_port: optional_parse("SMTP_PORT", 587u16)?,
            username,
            password,
            from,
            recipient,
            timeout: Duration::from_secs(optional_parse("MAIL_TIMEOUT_SECS", 10u64)?),
        })
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("recipient", &self.recipient)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// What the visitor is charged for and where the processor sends them back.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub public_base_url: String,
    pub item_title: String,
    pub unit_price: Decimal,
    pub correlation: CorrelationPolicy,
}

impl CheckoutConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "https://ficha-tlc.onrender.com".to_string());
        let item_title =
            env::var("CHECKOUT_ITEM_TITLE").unwrap_or_else(|_| "Inscrição TLC 2025".to_string());
        let unit_price = match env::var("CHECKOUT_UNIT_PRICE") {
            Ok(raw) => Decimal::from_str(raw.trim()).map_err(|_| ConfigError::Invalid {
                key: "CHECKOUT_UNIT_PRICE",
                reason: "expected a decimal amount",
            })?,
            Err(_) => Decimal::new(10000, 2),
        };
        if unit_price <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "CHECKOUT_UNIT_PRICE",
                reason: "must be greater than zero",
            });
        }
        let correlation = match env::var("RECONCILE_CORRELATION") {
            Ok(raw) => CorrelationPolicy::parse(&raw)?,
            Err(_) => CorrelationPolicy::default(),
        };

        Ok(Self {
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            item_title,
            unit_price,
            correlation,
        })
    }

    pub fn success_url(&self) -> String {
        format!("{}/obrigado", self.public_base_url)
    }

    pub fn retry_url(&self) -> String {
        format!("{}/", self.public_base_url)
    }

    pub fn notification_url(&self) -> String {
        format!("{}/webhook", self.public_base_url)
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn optional_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            key,
            reason: "could not be parsed",
        }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    Missing(&'static str),
    Invalid {
        key: &'static str,
        reason: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::Missing(key) => write!(f, "{key} is required but not set"),
            ConfigError::Invalid { key, reason } => write!(f, "{key} is invalid: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort | ConfigError::Missing(_) | ConfigError::Invalid { .. } => {
                None
            }
        }
    }
}
