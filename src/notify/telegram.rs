// Telegram Bot API notifications
// Sends alerts to a single chat through `sendMessage`, one at a time and in
// the order they were raised.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Notifier;
use crate::config::TelegramSettings;
use crate::execution::RetryPolicy;

pub const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
    chat_id: String,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: TELEGRAM_API.to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
            retry: RetryPolicy::notification(),
        }
    }

    /// Client for the configured chat, `None` when token or chat id is missing
    pub fn from_settings(settings: &TelegramSettings) -> Option<Self> {
        match (&settings.token, &settings.chat_id) {
            (Some(token), Some(chat_id)) if settings.is_configured() => {
                tracing::info!("Telegram notifications enabled");
                Some(Self::new(token.clone(), chat_id.clone()))
            }
            _ => None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Single delivery attempt
    pub async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!("Telegram notification sent");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Deliver with retries, logging and dropping the message on final failure
    pub async fn deliver(&self, text: &str) -> Result<(), NotifyError> {
        let result = self
            .retry
            .run("Telegram notification", |_| true, |_| self.send_message(text))
            .await;
        if let Err(e) = &result {
            tracing::error!("Dropping notification: {}", e);
        }
        result
    }
}

/// Queues alerts for a single delivery task
///
/// The task ends once every notifier handle is dropped and the queue is
/// drained; await its `JoinHandle` to flush before exiting.
#[derive(Clone)]
pub struct TelegramNotifier {
    queue: mpsc::UnboundedSender<String>,
}

impl TelegramNotifier {
    /// Must be called inside a tokio runtime
    pub fn spawn(client: TelegramClient) -> (Self, JoinHandle<()>) {
        let (queue, mut rx) = mpsc::unbounded_channel::<String>();
        let delivery = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let _ = client.deliver(&message).await;
            }
            tracing::debug!("Telegram delivery queue closed");
        });
        (Self { queue }, delivery)
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, message: String) {
        if self.queue.send(message).is_err() {
            tracing::warn!("Telegram delivery task gone, dropping notification");
        }
    }
}
