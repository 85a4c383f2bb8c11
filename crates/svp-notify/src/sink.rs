//! Alert delivery.
//!
//! [`AlertSink`] is the seam between the orchestrator and the outbound
//! transport. [`WebhookSink`] posts to a chat webhook; [`MockAlertSink`]
//! records messages for tests.

use crate::config::NotifyConfig;
use crate::error::{NotifyError, NotifyResult};
use crate::message::AlertMessage;
use reqwest::Client;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Accepted by the transport.
    Delivered,
    /// No destination configured; nothing was sent.
    Skipped,
    /// Transport refused or failed.
    Failed(String),
}

impl DeliveryResult {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryResult::Delivered)
    }
}

/// Destination for alerts.
pub trait AlertSink: Send + Sync {
    /// Deliver one alert.
    fn deliver(&self, message: AlertMessage) -> BoxFuture<'_, DeliveryResult>;
}

/// Arc wrapper for AlertSink trait objects.
pub type DynAlertSink = Arc<dyn AlertSink>;

/// Chat webhook sink. Posts `{"content": text}`; any 2xx is success.
pub struct WebhookSink {
    client: Client,
    url: Option<String>,
}

impl WebhookSink {
    pub fn new(url: Option<String>, timeout: Duration) -> NotifyResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        if url.is_none() {
            warn!("No webhook URL configured, alerts will only be logged");
        }
        Ok(Self { client, url })
    }

    /// Build from config, resolving the URL from the environment.
    pub fn from_config(config: &NotifyConfig) -> NotifyResult<Self> {
        Self::new(
            config.resolve_webhook_url(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    async fn post(&self, url: &str, text: String) -> NotifyResult<()> {
        let payload = serde_json::json!({ "content": text });
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

impl AlertSink for WebhookSink {
    fn deliver(&self, message: AlertMessage) -> BoxFuture<'_, DeliveryResult> {
        Box::pin(async move {
            let Some(url) = self.url.as_deref() else {
                info!(kind = %message.kind, score = message.score, "Alert not sent: no webhook");
                return DeliveryResult::Skipped;
            };

            match self.post(url, message.render()).await {
                Ok(()) => {
                    info!(
                        kind = %message.kind,
                        score = message.score,
                        test_mode = message.test_mode,
                        "Alert delivered"
                    );
                    DeliveryResult::Delivered
                }
                Err(e) => {
                    warn!(kind = %message.kind, error = %e, "Alert delivery failed");
                    DeliveryResult::Failed(e.to_string())
                }
            }
        })
    }
}

/// Recording sink for tests.
#[derive(Debug)]
pub struct MockAlertSink {
    /// Recorded deliveries.
    messages: parking_lot::Mutex<Vec<AlertMessage>>,
    /// Result to return.
    next_result: parking_lot::Mutex<DeliveryResult>,
}

impl Default for MockAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAlertSink {
    pub fn new() -> Self {
        Self {
            messages: parking_lot::Mutex::new(Vec::new()),
            next_result: parking_lot::Mutex::new(DeliveryResult::Delivered),
        }
    }

    pub fn set_next_result(&self, result: DeliveryResult) {
        *self.next_result.lock() = result;
    }

    pub fn messages(&self) -> Vec<AlertMessage> {
        self.messages.lock().clone()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl AlertSink for MockAlertSink {
    fn deliver(&self, message: AlertMessage) -> BoxFuture<'_, DeliveryResult> {
        Box::pin(async move {
            self.messages.lock().push(message);
            self.next_result.lock().clone()
        })
    }
}
