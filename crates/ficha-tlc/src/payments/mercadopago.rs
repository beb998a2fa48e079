use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway, ProcessorPayment};
use crate::config::PaymentConfig;
use crate::workflows::registration::PaymentStatus;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// REST client for the Mercado Pago checkout and payments APIs.
#[derive(Clone)]
pub struct MercadoPagoClient {
    http: reqwest::Client,
    api_base: Url,
    access_token: String,
}

impl std::fmt::Debug for MercadoPagoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MercadoPagoClient")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: Value,
    status: Option<String>,
    external_reference: Option<String>,
}

impl MercadoPagoClient {
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| PaymentError::Transport(err.to_string()))?;
        let api_base = Url::parse(&config.api_base)
            .map_err(|err| PaymentError::Transport(format!("invalid api base: {err}")))?;
        if api_base.cannot_be_a_base() {
            return Err(PaymentError::Transport(format!(
                "invalid api base: {}",
                config.api_base
            )));
        }

        Ok(Self {
            http,
            api_base,
            access_token: config.access_token.clone(),
        })
    }

    /// Appends each segment percent-encoded, so ids cannot add path
    /// components or a query string.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn read_body(response: reqwest::Response) -> String {
        response.text().await.unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .http
            .post(self.endpoint(&["checkout", "preferences"]))
            .bearer_auth(&self.access_token)
            .json(request)
            .send()
            .await
            .map_err(|err| PaymentError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                body: Self::read_body(response).await,
            });
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|err| PaymentError::Decode(err.to_string()))?;
        debug!(preference_id = %session.id, "checkout preference created");
        Ok(session)
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<ProcessorPayment, PaymentError> {
        let response = self
            .http
            .get(self.endpoint(&["v1", "payments", payment_id]))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| PaymentError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                body: Self::read_body(response).await,
            });
        }
        if status == StatusCode::NOT_FOUND || !status.is_success() {
            debug!(%payment_id, status = status.as_u16(), "payment lookup unsuccessful");
            return Err(PaymentError::NotFound(payment_id.to_string()));
        }

        let payload: PaymentResponse = response
            .json()
            .await
            .map_err(|err| PaymentError::Decode(err.to_string()))?;

        Ok(ProcessorPayment {
            id: scalar_to_string(&payload.id).unwrap_or_else(|| payment_id.to_string()),
            status: payload
                .status
                .as_deref()
                .map(PaymentStatus::from)
                .ok_or_else(|| PaymentError::Decode("payment has no status".to_string()))?,
            external_reference: payload
                .external_reference
                .filter(|reference| !reference.trim().is_empty()),
        })
    }
}

/// Processor ids arrive as JSON numbers or strings depending on the API.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) if !raw.trim().is_empty() => Some(raw.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_accept_numbers_and_strings() {
        assert_eq!(scalar_to_string(&json!(123456)), Some("123456".to_string()));
        assert_eq!(scalar_to_string(&json!(" pay_abc ")), Some("pay_abc".to_string()));
        assert_eq!(scalar_to_string(&json!("")), None);
        assert_eq!(scalar_to_string(&json!(null)), None);
    }

    fn client(api_base: &str) -> MercadoPagoClient {
        MercadoPagoClient::new(&PaymentConfig {
            access_token: "APP_USR-secret".to_string(),
            api_base: api_base.to_string(),
            lookup_attempts: 3,
        })
        .expect("client builds")
    }

    #[test]
    fn debug_output_hides_token() {
        let client = client("https://api.mercadopago.com");
        assert!(!format!("{client:?}").contains("APP_USR-secret"));
    }

    #[test]
    fn payment_ids_stay_a_single_path_segment() {
        let client = client("https://api.mercadopago.com");

        let url = client.endpoint(&["v1", "payments", "123456"]);
        assert_eq!(url.as_str(), "https://api.mercadopago.com/v1/payments/123456");

        let url = client.endpoint(&["v1", "payments", "../../users/me"]);
        assert!(url.path().starts_with("/v1/payments/"), "escaped to {}", url.path());
        assert_eq!(url.path_segments().map(Iterator::count), Some(3));

        let url = client.endpoint(&["v1", "payments", "123?access_token=x"]);
        assert_eq!(url.query(), None);
        assert_eq!(url.path(), "/v1/payments/123%3Faccess_token=x");
    }

    #[test]
    fn api_base_may_carry_a_prefix() {
        let client = client("http://127.0.0.1:9000/sandbox");
        let url = client.endpoint(&["checkout", "preferences"]);
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/sandbox/checkout/preferences");
    }

    #[test]
    fn unparsable_api_base_is_rejected() {
        let result = MercadoPagoClient::new(&PaymentConfig {
            access_token: "APP_USR-secret".to_string(),
            api_base: "not a url".to_string(),
            lookup_attempts: 3,
        });
        assert!(matches!(result, Err(PaymentError::Transport(_))));
    }
}
