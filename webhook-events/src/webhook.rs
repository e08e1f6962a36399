//! Webhook client
//!
//! Bodies are signed with HMAC-SHA256 keyed by the app's webhook secret;
//! the base64 digest travels in the `X-Agora-HMAC-SHA256` header.

use crate::{
    event::b64,
    metrics::{WEBHOOK_CALLS_TOTAL, WEBHOOK_CALL_DURATION},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Signature header
pub const HMAC_HEADER: &str = "X-Agora-HMAC-SHA256";

/// Webhook call failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// Body could not be signed
    #[error("failed to sign body: {0}")]
    Signing(String),

    /// Body could not be encoded or decoded
    #[error("failed to encode body: {0}")]
    Encoding(String),

    /// Request never got a response
    #[error("request failed: {0}")]
    Request(String),

    /// Unexpected status
    #[error("webhook returned {status}: {body}")]
    Status {
        /// HTTP status
        status: u16,

        /// Response body
        body: String,
    },
}

impl WebhookError {
    /// Whether retrying the call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            WebhookError::Request(_) => true,
            WebhookError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            WebhookError::Signing(_) | WebhookError::Encoding(_) => false,
        }
    }
}

/// Body of a sign-transaction webhook call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignTransactionRequest {
    /// Binary transaction envelope
    #[serde(with = "b64")]
    pub envelope_xdr: Vec<u8>,

    /// Invoice attached to the transaction
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::event::b64_opt"
    )]
    pub invoice_list: Option<Vec<u8>>,
}

/// Why an app rejected an invoice line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceError {
    /// Operation the invoice belongs to
    pub operation_index: u32,

    /// `already_paid`, `wrong_destination`, `sku_not_found` or `unknown`
    pub reason: String,
}

/// Outcome of a sign-transaction call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignTransactionResponse {
    /// App approved (200); it may return a co-signed envelope
    Approved {
        /// Envelope signed by the app
        envelope_xdr: Option<Vec<u8>>,
    },

    /// App rejected (403)
    Rejected {
        /// Per-invoice rejection reasons
        invoice_errors: Vec<InvoiceError>,
    },
}

#[derive(Deserialize)]
struct ApprovedBody {
    #[serde(default, with = "crate::event::b64_opt")]
    envelope_xdr: Option<Vec<u8>>,
}

#[derive(Deserialize)]
struct RejectedBody {
    #[serde(default)]
    invoice_errors: Vec<InvoiceError>,
}

/// Calls app webhooks
#[async_trait]
pub trait WebhookClient: Send + Sync {
    /// POST a JSON array of events
    async fn events(&self, url: &str, secret: &str, body: Vec<u8>) -> Result<(), WebhookError>;

    /// Ask an app to approve a transaction
    async fn sign_transaction(
        &self,
        url: &str,
        secret: &str,
        request: &SignTransactionRequest,
    ) -> Result<SignTransactionResponse, WebhookError>;
}

/// Base64 HMAC-SHA256 of `body`
pub fn sign_body(secret: &str, body: &[u8]) -> Result<String, WebhookError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::Signing(e.to_string()))?;
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Webhook client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Per-call timeout (milliseconds)
    pub timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

/// reqwest-backed webhook client
#[derive(Debug, Clone)]
pub struct HttpWebhookClient {
    client: Client,
}

impl HttpWebhookClient {
    /// Create client
    pub fn new(config: &WebhookConfig) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| WebhookError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    async fn post(
        &self,
        kind: &'static str,
        url: &str,
        secret: &str,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, WebhookError> {
        let signature = sign_body(secret, &body)?;
        let start = Instant::now();

        let result = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(HMAC_HEADER, signature)
            .body(body)
            .send()
            .await;

        WEBHOOK_CALL_DURATION
            .with_label_values(&[kind])
            .observe(start.elapsed().as_secs_f64());

        let status = match &result {
            Ok(response) => response.status().as_str().to_string(),
            Err(_) => "error".to_string(),
        };
        WEBHOOK_CALLS_TOTAL
            .with_label_values(&[kind, status.as_str()])
            .inc();

        result.map_err(|e| {
            warn!(kind, "Webhook request failed: {}", e);
            WebhookError::Request(e.to_string())
        })
    }
}

async fn status_error(response: reqwest::Response) -> WebhookError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    WebhookError::Status { status, body }
}

#[async_trait]
impl WebhookClient for HttpWebhookClient {
    async fn events(&self, url: &str, secret: &str, body: Vec<u8>) -> Result<(), WebhookError> {
        let response = self.post("events", url, secret, body).await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        debug!(url, "Events webhook called");
        Ok(())
    }

    async fn sign_transaction(
        &self,
        url: &str,
        secret: &str,
        request: &SignTransactionRequest,
    ) -> Result<SignTransactionResponse, WebhookError> {
        let body =
            serde_json::to_vec(request).map_err(|e| WebhookError::Encoding(e.to_string()))?;
        let response = self.post("sign_transaction", url, secret, body).await?;

        match response.status() {
            StatusCode::OK => {
                let body: ApprovedBody = response
                    .json()
                    .await
                    .map_err(|e| WebhookError::Encoding(e.to_string()))?;
                Ok(SignTransactionResponse::Approved {
                    envelope_xdr: body.envelope_xdr,
                })
            }
            StatusCode::FORBIDDEN => {
                let body: RejectedBody = response
                    .json()
                    .await
                    .map_err(|e| WebhookError::Encoding(e.to_string()))?;
                Ok(SignTransactionResponse::Rejected {
                    invoice_errors: body.invoice_errors,
                })
            }
            _ => Err(status_error(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_body() {
        // RFC 4231 test case 2
        let signature = sign_body("Jefe", b"what do ya want for nothing?").unwrap();
        let expected = STANDARD.encode(
            [
                0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24, 0x26, 0x08,
                0x95, 0x75, 0xc7, 0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27, 0x39, 0x83, 0x9d, 0xec,
                0x58, 0xb9, 0x64, 0xec, 0x38, 0x43,
            ],
        );
        assert_eq!(signature, expected);
    }

    #[test]
    fn test_transient_statuses() {
        let status = |status| WebhookError::Status {
            status,
            body: String::new(),
        };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(404).is_transient());
        assert!(WebhookError::Request("reset".to_string()).is_transient());
    }

    #[test]
    fn test_sign_request_body() {
        let request = SignTransactionRequest {
            envelope_xdr: vec![1, 2, 3],
            invoice_list: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, serde_json::json!({"envelope_xdr": "AQID"}));
    }
}
