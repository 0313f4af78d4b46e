use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::messages::{Button, Message};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The recipient has no reachable messaging identity. Retrying won't help.
    #[error("recipient has no reachable channel")]
    NoChannel,
    #[error("delivery timed out")]
    Timeout,
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl NotifyError {
    fn outcome_label(&self) -> &'static str {
        match self {
            NotifyError::NoChannel => "no_channel",
            NotifyError::Timeout => "timeout",
            NotifyError::Delivery(_) => "failed",
        }
    }
}

/// Outbound messaging collaborator. Failures are reported, never fatal to the caller.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user_id: &str, text: &str, buttons: &[Button]) -> Result<(), NotifyError>;
}

/// Deliver `message` to `user_id` with a hard timeout, recording the outcome.
pub async fn deliver(
    sink: &dyn NotificationSink,
    user_id: Option<&str>,
    message: &Message,
    timeout: Duration,
) -> Result<(), NotifyError> {
    let result = match user_id {
        None => Err(NotifyError::NoChannel),
        Some(user_id) => tokio::time::timeout(timeout, sink.notify(user_id, &message.text, &message.buttons))
            .await
            .unwrap_or(Err(NotifyError::Timeout)),
    };
    let outcome = match &result {
        Ok(()) => "sent",
        Err(e) => e.outcome_label(),
    };
    metrics::counter!(crate::observability::NOTIFICATIONS_TOTAL, "intent" => message.intent, "outcome" => outcome)
        .increment(1);
    result
}

// ── Webhook ─────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookRequest<'a> {
    telegram_user_id: serde_json::Value,
    text: &'a str,
    #[serde(skip_serializing_if = "no_buttons")]
    buttons: &'a [Button],
}

fn no_buttons(buttons: &&[Button]) -> bool {
    buttons.is_empty()
}

#[derive(Deserialize)]
struct WebhookResponse {
    success: bool,
    error: Option<String>,
}

/// Posts messages to a bot webhook at `{base_url}/notify-booking`.
#[derive(Clone, Debug)]
pub struct WebhookSink {
    endpoint: String,
    http_client: Client,
}

impl WebhookSink {
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: format!("{}/notify-booking", base_url.trim_end_matches('/')),
            http_client: Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, user_id: &str, text: &str, buttons: &[Button]) -> Result<(), NotifyError> {
        // The bot expects a numeric id; fall back to the raw string otherwise.
        let telegram_user_id = user_id
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::from(user_id));
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&WebhookRequest {
                telegram_user_id,
                text,
                buttons,
            })
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        let body: WebhookResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Delivery(format!("{status}: {e}")))?;
        if body.success {
            Ok(())
        } else {
            Err(NotifyError::Delivery(body.error.unwrap_or_else(|| status.to_string())))
        }
    }
}

/// Logs instead of sending. Used when no webhook is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, user_id: &str, text: &str, buttons: &[Button]) -> Result<(), NotifyError> {
        info!(user_id, buttons = buttons.len(), "notification (not sent): {text}");
        Ok(())
    }
}

/// Log a failed delivery the same way everywhere.
pub fn log_failure(intent: &str, booking_id: ulid::Ulid, err: &NotifyError) {
    warn!(intent, booking = %booking_id, "notification failed: {err}");
}
