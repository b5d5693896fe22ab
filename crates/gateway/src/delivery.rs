//! Delivery API client.
//!
//! `POST {base_url}/send` with the shared API key. Network failures and
//! 5xx are retried inside the circuit breaker; a 4xx means the request was
//! bad, so it is neither retried nor counted against the dependency.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::circuit_breaker::{BreakerError, CircuitBreaker};
use crate::config::GatewayConfig;
use dispatch_core::{Error, Result};

/// Message handed to the delivery API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryRequest {
    pub recipient: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// Only used for logging; not part of the wire body.
    #[serde(skip)]
    pub notification_type: String,
}

impl DeliveryRequest {
    pub fn new(
        recipient: impl Into<String>,
        message: impl Into<String>,
        notification_type: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            message: message.into(),
            tenant_id: None,
            media_url: None,
            notification_type: notification_type.into(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_media_url(mut self, media_url: Option<String>) -> Self {
        self.media_url = media_url;
        self
    }
}

/// Accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider message id, when the API returned one.
    pub message_id: Option<String>,
    /// HTTP attempts made, including the first.
    pub attempts: u32,
}

/// Why a delivery did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("delivery request timed out")]
    Timeout,

    #[error("delivery API unreachable: {0}")]
    Connect(String),

    #[error("delivery rejected with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("delivery API failed with {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("unreadable delivery response: {0}")]
    InvalidResponse(String),

    #[error("delivery transport error: {0}")]
    Transport(String),

    #[error("delivery circuit open, retry in {retry_in:?}")]
    CircuitOpen { retry_in: Duration },

    #[error("delivery exceeded its {0:?} deadline")]
    Deadline(Duration),
}

impl DeliveryError {
    /// Whether another attempt could succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connect(_) | Self::Upstream { .. } | Self::Transport(_)
        )
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Anything that can deliver a rendered message to a recipient.
#[async_trait]
pub trait MessageDelivery: Send + Sync {
    async fn deliver(&self, request: &DeliveryRequest) -> std::result::Result<DeliveryReceipt, DeliveryError>;
}

/// Outcome of one attempt that the breaker should treat as healthy.
type Answered = std::result::Result<DeliveryReceipt, DeliveryError>;

/// HTTP delivery gateway protected by a circuit breaker.
pub struct HttpDeliveryGateway {
    config: GatewayConfig,
    send_url: Url,
    api_key: (HeaderName, HeaderValue),
    http_client: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
}

impl HttpDeliveryGateway {
    pub fn new(config: GatewayConfig, breaker: Arc<CircuitBreaker>) -> Result<Self> {
        let send_url = config.send_url()?;
        let api_key = api_key_header(&config.api_key_header, &config.api_key)?;
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            send_url,
            api_key,
            http_client,
            breaker,
        })
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Retries transient failures with linear backoff.
    ///
    /// The outer error is what trips the breaker; the inner result carries
    /// answers from a healthy dependency, including rejections.
    async fn send_with_retry(
        &self,
        request: &DeliveryRequest,
    ) -> std::result::Result<Answered, DeliveryError> {
        let mut last_error = None;

        for attempt in 0..=self.config.retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff() * attempt;
                warn!(
                    attempt = attempt,
                    backoff_ms = %backoff.as_millis(),
                    recipient = %request.recipient,
                    "Retrying delivery"
                );
                metrics().delivery_retries.inc();
                tokio::time::sleep(backoff).await;
            }

            metrics().delivery_attempts.inc();
            match self.send_once(request).await {
                Ok(message_id) => {
                    return Ok(Ok(DeliveryReceipt {
                        message_id,
                        attempts: attempt + 1,
                    }))
                }
                Err(e) if e.is_retriable() => {
                    debug!(attempt = attempt, error = %e, "Delivery attempt failed");
                    last_error = Some(e);
                }
                Err(e) => return Ok(Err(e)),
            }
        }

        Err(last_error.unwrap_or_else(|| DeliveryError::Transport("no attempt made".into())))
    }

    async fn send_once(
        &self,
        request: &DeliveryRequest,
    ) -> std::result::Result<Option<String>, DeliveryError> {
        let response = self
            .http_client
            .post(self.send_url.clone())
            .header(self.api_key.0.clone(), self.api_key.1.clone())
            .json(request)
            .send()
            .await
            .map_err(DeliveryError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(DeliveryError::from_reqwest)?;

        if status.is_client_error() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        if !status.is_success() {
            return Err(DeliveryError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        extract_message_id(&body)
    }
}

/// Parses the configured API key header once, so a bad value fails at startup.
pub(crate) fn api_key_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::config(format!("invalid api key header name {}: {}", name, e)))?;
    let mut value = HeaderValue::from_str(value)
        .map_err(|e| Error::config(format!("invalid api key header value: {}", e)))?;
    value.set_sensitive(true);
    Ok((name, value))
}

#[async_trait]
impl MessageDelivery for HttpDeliveryGateway {
    async fn deliver(&self, request: &DeliveryRequest) -> std::result::Result<DeliveryReceipt, DeliveryError> {
        let started = Instant::now();
        let result = self.breaker.execute(|| self.send_with_retry(request)).await;
        metrics()
            .delivery_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        match result {
            Ok(answered) => answered,
            Err(BreakerError::Inner(e)) => Err(e),
            Err(BreakerError::Timeout(limit)) => Err(DeliveryError::Deadline(limit)),
            Err(BreakerError::Open { retry_in, .. }) => {
                metrics().breaker_rejections.inc();
                Err(DeliveryError::CircuitOpen { retry_in })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    message_id: Option<serde_json::Value>,
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    data: Option<SendResponseData>,
}

#[derive(Debug, Deserialize)]
struct SendResponseData {
    #[serde(default)]
    message_id: Option<serde_json::Value>,
}

/// Pulls the provider message id out of a success body.
///
/// Looks at `message_id`, then `id`, then `data.message_id`. An empty body
/// is accepted with no id.
fn extract_message_id(body: &str) -> std::result::Result<Option<String>, DeliveryError> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let parsed: SendResponse = serde_json::from_str(body)
        .map_err(|e| DeliveryError::InvalidResponse(e.to_string()))?;

    let id = parsed
        .message_id
        .or(parsed.id)
        .or_else(|| parsed.data.and_then(|d| d.message_id))
        .and_then(|v| match v {
            serde_json::Value::String(s) if !s.is_empty() => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    Ok(id)
}
