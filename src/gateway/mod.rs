use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::GatewayConfig;

/// Gateway failures, split by retryability.
///
/// `Rejected` is a well-formed "no" from the provider and is final for the
/// attempt. `Unavailable` means the provider could not be reached (transport
/// failure or timeout); the caller may retry verification later, but must never
/// blindly replay an initiation with the same tx_ref.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Unavailable(String),
}

/// Payer identity and correlation data for a checkout initiation.
#[derive(Debug, Clone, Serialize)]
pub struct InitializeRequest {
    pub amount: Decimal,
    pub currency: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tx_ref: String,
    pub callback_url: String,
    pub return_url: String,
    pub customization: Customization,
}

#[derive(Debug, Clone, Serialize)]
pub struct Customization {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct InitializeResponse {
    /// Gateway-hosted payment page for the payer.
    pub checkout_url: String,
}

#[derive(Debug, Clone)]
pub struct VerifyResponse {
    /// True when the provider reports the transaction as paid.
    pub success: bool,
    /// Amount echoed by the provider, when present; used for mismatch checks.
    pub amount: Option<Decimal>,
    /// Full provider payload for audit logging.
    pub raw: serde_json::Value,
}

/// Typed seam over the external payment provider. The client never retries on
/// its own; retry policy belongs to the caller to avoid duplicate charges.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, req: InitializeRequest) -> Result<InitializeResponse, GatewayError>;
    async fn verify(&self, tx_ref: &str) -> Result<VerifyResponse, GatewayError>;
}

/// Chapa-compatible HTTP client with a bounded per-request timeout.
pub struct ChapaGateway {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct ProviderEnvelope {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

impl ChapaGateway {
    pub fn new(cfg: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            secret_key: cfg.secret_key.clone(),
        })
    }

    fn transport_error(err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Unavailable("gateway request timed out".to_string())
        } else {
            GatewayError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl PaymentGateway for ChapaGateway {
    #[instrument(skip(self, req), fields(tx_ref = %req.tx_ref, amount = %req.amount))]
    async fn initialize(&self, req: InitializeRequest) -> Result<InitializeResponse, GatewayError> {
        let response = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&req)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let http_status = response.status();
        let envelope: ProviderEnvelope = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("malformed gateway response: {}", e)))?;

        if !http_status.is_success() || envelope.status.as_deref() != Some("success") {
            return Err(GatewayError::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| format!("gateway returned status {}", http_status)),
            ));
        }

        let checkout_url = envelope
            .data
            .get("checkout_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                GatewayError::Rejected("initialize response missing checkout_url".to_string())
            })?
            .to_string();

        debug!(%checkout_url, "gateway checkout initialized");
        Ok(InitializeResponse { checkout_url })
    }

    #[instrument(skip(self))]
    async fn verify(&self, tx_ref: &str) -> Result<VerifyResponse, GatewayError> {
        let response = self
            .http
            .get(format!("{}/transaction/verify/{}", self.base_url, tx_ref))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let http_status = response.status();
        if http_status.is_server_error() {
            return Err(GatewayError::Unavailable(format!(
                "gateway returned status {}",
                http_status
            )));
        }

        let envelope: ProviderEnvelope = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("malformed gateway response: {}", e)))?;

        let success = envelope.status.as_deref() == Some("success")
            && envelope.data.get("status").and_then(|v| v.as_str()) == Some("success");

        let amount = envelope
            .data
            .get("amount")
            .and_then(|v| match v {
                serde_json::Value::String(s) => s.parse::<Decimal>().ok(),
                serde_json::Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
                _ => None,
            });

        Ok(VerifyResponse {
            success,
            amount,
            raw: envelope.data,
        })
    }
}
