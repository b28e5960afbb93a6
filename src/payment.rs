//! Payment processor adapter.
//!
//! Talks to Stripe's REST API directly (form-encoded requests, basic auth with the
//! secret key) rather than through an SDK.

use crate::config::PaymentConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// Intent status once the customer's payment has been captured.
pub const STATUS_SUCCEEDED: &str = "succeeded";

/// Payment intent as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    /// Intent ID (`pi_...`).
    pub id: String,
    /// Amount in minor currency units.
    pub amount: i64,
    /// Lowercase ISO currency code.
    pub currency: String,
    /// Processor status (`requires_payment_method`, `succeeded`, ...).
    pub status: String,
    /// Secret handed to the client to complete payment.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Metadata attached at creation.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    /// Whether the intent has been paid.
    pub fn is_succeeded(&self) -> bool {
        self.status == STATUS_SUCCEEDED
    }
}

/// Payment processor operations used by checkout.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an intent for `amount` tagged with the order ID.
    async fn create_intent(&self, amount: i64, currency: &str, order_id: &str)
    -> Result<PaymentIntent>;

    /// Fetch an intent by ID.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent>;
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Stripe implementation of [`PaymentGateway`].
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: Option<String>,
    api_base: String,
}

impl StripeGateway {
    /// Create a gateway from the `[payment]` section.
    pub fn new(config: &PaymentConfig) -> Self {
        if config.secret_key.is_none() {
            tracing::warn!("No payment secret key configured, checkout will fail");
        }

        Self {
            client: reqwest::Client::new(),
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    fn secret_key(&self) -> Result<&str> {
        self.secret_key
            .as_deref()
            .ok_or_else(|| AppError::Payment("Payment processor is not configured".into()))
    }

    async fn read_intent(response: reqwest::Response) -> Result<PaymentIntent> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Payment(format!("Failed to read processor response: {}", e)))?;

        parse_response(status.is_success(), &body)
    }
}

/// Decode a processor response body into an intent or a payment error.
fn parse_response(success: bool, body: &str) -> Result<PaymentIntent> {
    if success {
        return serde_json::from_str(body)
            .map_err(|e| AppError::Payment(format!("Unexpected processor response: {}", e)));
    }

    let message = serde_json::from_str::<StripeErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message.or(b.error.kind))
        .unwrap_or_else(|| "Payment processor request failed".to_string());
    Err(AppError::Payment(message))
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        order_id: &str,
    ) -> Result<PaymentIntent> {
        let amount = amount.to_string();
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(self.secret_key()?, None::<&str>)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency),
                ("automatic_payment_methods[enabled]", "true"),
                ("metadata[order_id]", order_id),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(order_id = %order_id, error = %e, "Payment intent request failed");
                AppError::Payment(format!("Payment processor unreachable: {}", e))
            })?;

        Self::read_intent(response).await
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .basic_auth(self.secret_key()?, None::<&str>)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(intent_id = %intent_id, error = %e, "Payment intent lookup failed");
                AppError::Payment(format!("Payment processor unreachable: {}", e))
            })?;

        Self::read_intent(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_intent() {
        let body = r#"{
            "id": "pi_123",
            "object": "payment_intent",
            "amount": 2759,
            "currency": "usd",
            "status": "requires_payment_method",
            "client_secret": "pi_123_secret_abc",
            "metadata": { "order_id": "o1" }
        }"#;

        let intent = parse_response(true, body).unwrap();
        assert_eq!(intent.amount, 2759);
        assert_eq!(intent.metadata.get("order_id").map(String::as_str), Some("o1"));
        assert!(!intent.is_succeeded());
    }

    #[test]
    fn test_parse_error_message() {
        let body = r#"{"error": {"type": "invalid_request_error", "message": "No such payment_intent"}}"#;
        let err = parse_response(false, body).unwrap_err();
        assert!(matches!(err, AppError::Payment(ref m) if m == "No such payment_intent"));

        assert!(matches!(
            parse_response(false, "<html>"),
            Err(AppError::Payment(_))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_fails_without_request() {
        let gateway = StripeGateway::new(&PaymentConfig::default());
        let err = gateway.create_intent(100, "usd", "o1").await.unwrap_err();
        assert!(matches!(err, AppError::Payment(_)));
    }
}
