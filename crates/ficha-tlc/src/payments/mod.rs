//! Checkout-session creation and payment lookup against the payment
//! processor.

pub mod mercadopago;

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::workflows::registration::PaymentStatus;

pub use mercadopago::MercadoPagoClient;

/// Line item charged at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub title: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Where the processor sends the payer after the hosted page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

/// Body of a checkout preference. Field names follow the processor's wire
/// format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
    pub back_urls: BackUrls,
    pub auto_return: String,
    pub external_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub init_point: String,
}

/// Authoritative payment state as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorPayment {
    pub id: String,
    pub status: PaymentStatus,
    pub external_reference: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment {0} not found at processor")]
    NotFound(String),
    #[error("processor rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("processor unreachable: {0}")]
    Transport(String),
    #[error("unexpected processor response: {0}")]
    Decode(String),
}

impl PaymentError {
    /// Errors worth another attempt: network trouble and processor 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            PaymentError::Transport(_) => true,
            PaymentError::Rejected { status, .. } => *status >= 500,
            PaymentError::NotFound(_) | PaymentError::Decode(_) => false,
        }
    }
}

/// Outbound port to the payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<ProcessorPayment, PaymentError>;
}

/// Bounded exponential backoff for idempotent processor reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Looks a payment up, retrying transient failures per `policy`.
pub async fn fetch_payment_with_retry<G>(
    gateway: &G,
    payment_id: &str,
    policy: RetryPolicy,
) -> Result<ProcessorPayment, PaymentError>
where
    G: PaymentGateway + ?Sized,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match gateway.fetch_payment(payment_id).await {
            Ok(payment) => return Ok(payment),
            Err(err) if err.is_transient() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(%payment_id, attempt, ?delay, error = %err, "payment lookup failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
