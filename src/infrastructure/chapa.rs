use crate::config::GatewayConfig;
use crate::domain::payment::GatewayStatus;
use crate::domain::ports::{Checkout, CheckoutRequest, PaymentGateway, Verification};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// HTTP client for the Chapa v1 transaction API.
///
/// Every call is bounded by the configured timeout. Transport failures,
/// non-2xx answers and envelopes whose `status` is not `"success"` come back
/// as `GatewayTimeout` / `GatewayError` values.
pub struct ChapaGateway {
    client: Client,
    config: GatewayConfig,
}

#[derive(Serialize)]
struct InitializeBody<'a> {
    amount: String,
    currency: &'a str,
    email: &'a str,
    tx_ref: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    callback_url: String,
    return_url: String,
}

impl ChapaGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MarketError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            warn!(%status, "payment gateway rejected request");
            return Err(MarketError::GatewayError(format!(
                "HTTP {status}: {}",
                snippet(&text)
            )));
        }
        serde_json::from_str(&text).map_err(|e| {
            MarketError::GatewayError(format!("unreadable gateway response: {e}"))
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> MarketError {
        if err.is_timeout() {
            warn!(timeout = ?self.config.timeout, "payment gateway timed out");
            MarketError::GatewayTimeout(self.config.timeout)
        } else {
            warn!(error = %err, "payment gateway unreachable");
            MarketError::GatewayError(err.to_string())
        }
    }
}

#[async_trait]
impl PaymentGateway for ChapaGateway {
    async fn initialize(&self, request: CheckoutRequest) -> Result<Checkout> {
        let reference = request
            .reference
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let body = InitializeBody {
            amount: request.amount.to_string(),
            currency: &request.currency,
            email: &request.email,
            tx_ref: &reference,
            first_name: &request.first_name,
            last_name: &request.last_name,
            callback_url: request
                .callback_url
                .unwrap_or_else(|| self.config.callback_url()),
            return_url: request
                .return_url
                .unwrap_or_else(|| self.config.return_url()),
        };

        debug!(tx_ref = %reference, amount = %body.amount, "initializing checkout");
        let url = format!("{}/transaction/initialize", self.config.base_url);
        let envelope = self.send(self.client.post(url).json(&body)).await?;
        let checkout_url = parse_checkout_url(&envelope)?;

        Ok(Checkout {
            checkout_url,
            reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<Verification> {
        debug!(tx_ref = %reference, "verifying transaction");
        let url = format!("{}/transaction/verify/{reference}", self.config.base_url);
        let envelope = self.send(self.client.get(url)).await?;
        parse_verification(envelope)
    }
}

fn ensure_success(envelope: &Value) -> Result<()> {
    match envelope.get("status").and_then(Value::as_str) {
        Some("success") => Ok(()),
        _ => {
            let message = envelope
                .get("message")
                .map(Value::to_string)
                .unwrap_or_else(|| "no message".to_string());
            Err(MarketError::GatewayError(format!(
                "gateway reported failure: {message}"
            )))
        }
    }
}

fn parse_checkout_url(envelope: &Value) -> Result<String> {
    ensure_success(envelope)?;
    envelope
        .pointer("/data/checkout_url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MarketError::GatewayError("response is missing checkout_url".to_string()))
}

fn parse_verification(envelope: Value) -> Result<Verification> {
    ensure_success(&envelope)?;
    let reported = envelope
        .pointer("/data/status")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(Verification {
        status: GatewayStatus::parse(reported),
        raw_payload: envelope,
    })
}

fn snippet(text: &str) -> String {
    text.chars().take(200).collect()
}
