//! Webhook notifications.
//!
//! Messages are posted as chat-bot text payloads:
//!
//! ```text
//! POST <webhook>
//! Content-Type: application/json;charset=utf-8
//!
//! {"msgtype":"text","text":{"content":"<message>"}}
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Content type sent with every webhook request.
pub const WEBHOOK_CONTENT_TYPE: &str = "application/json;charset=utf-8";

/// Message sent once a session is established.
pub const PUSH_ENABLED_MESSAGE: &str = "Data push enabled!";

/// Message sent when a register reading triggers a notification.
pub fn value_changed_message(address: u16, value: u16) -> String {
    format!("Register {} value changed: {}", address, value)
}

/// Notification errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Webhook URL is empty")]
    EmptyTarget,
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Webhook URL, guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookTarget(String);

impl WebhookTarget {
    /// Create a target from a URL; surrounding whitespace is trimmed.
    pub fn new(url: impl AsRef<str>) -> Result<Self, NotifyError> {
        let url = url.as_ref().trim();
        if url.is_empty() {
            return Err(NotifyError::EmptyTarget);
        }
        Ok(Self(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WebhookTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chat-bot text message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    pub msgtype: String,
    pub text: TextContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    pub content: String,
}

impl TextMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            msgtype: "text".to_string(),
            text: TextContent {
                content: content.into(),
            },
        }
    }
}

/// Sends text messages to a webhook.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, webhook: &WebhookTarget, message: &str) -> Result<(), NotifyError>;
}

/// Send `message` and log the outcome. Returns whether delivery succeeded.
///
/// Delivery failures never propagate past this point.
pub async fn deliver<N>(notifier: &N, webhook: &WebhookTarget, message: &str) -> bool
where
    N: Notifier + ?Sized,
{
    match notifier.notify(webhook, message).await {
        Ok(()) => {
            debug!(msg = message, "Message sent");
            true
        }
        Err(e) => {
            warn!(error = %e, msg = message, "Failed to send message");
            false
        }
    }
}

/// HTTP webhook notifier.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a notifier. `timeout` bounds each POST; `None` waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Result<Self, NotifyError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| NotifyError::DeliveryFailed(format!("HTTP client setup: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, webhook: &WebhookTarget, message: &str) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(&TextMessage::new(message))
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;

        let response = self
            .client
            .post(webhook.as_str())
            .header(CONTENT_TYPE, WEBHOOK_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::DeliveryFailed(format!("HTTP {}", status)));
        }

        Ok(())
    }
}
