//! Check-up notifications
//!
//! Sending is fire-and-forget: callers never wait on delivery and never see
//! delivery failures, which are only logged.

use std::sync::{Arc, Mutex};

use reqwest::Client;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

pub trait Notifier: Send + Sync {
  fn send_checkup_message(&self, patient_id: i64, text: &str);
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
  #[error("Request failed: {0}")]
  Request(String),

  #[error("Webhook returned HTTP {0}")]
  Status(u16),
}

impl From<reqwest::Error> for NotifyError {
  fn from(e: reqwest::Error) -> Self {
    NotifyError::Request(e.to_string())
  }
}

#[derive(Debug, Serialize)]
struct CheckupPayload<'a> {
  patient_id: i64,
  message: &'a str,
}

/// ---------------------------------------------------------------------------
/// Webhook
/// ---------------------------------------------------------------------------

async fn post_checkup(client: &Client, url: &Url, patient_id: i64, text: &str) -> Result<(), NotifyError> {
  let response = client
    .post(url.clone())
    .json(&CheckupPayload {
      patient_id,
      message: text,
    })
    .send()
    .await?;

  let status = response.status();
  if !status.is_success() {
    return Err(NotifyError::Status(status.as_u16()));
  }

  Ok(())
}

/// POSTs `{"patient_id": .., "message": ..}` to a configured URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
  client: Client,
  url: Url,
  pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl WebhookNotifier {
  pub fn new(url: Url) -> Self {
    Self {
      client: Client::new(),
      url,
      pending: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  /// Deliver one message and report the outcome
  pub async fn deliver(&self, patient_id: i64, text: &str) -> Result<(), NotifyError> {
    post_checkup(&self.client, &self.url, patient_id, text).await
  }

  /// Wait for every delivery spawned so far. Used before the runtime shuts down.
  pub async fn flush(&self) {
    let handles: Vec<JoinHandle<()>> = match self.pending.lock() {
      Ok(mut pending) => pending.drain(..).collect(),
      Err(_) => return,
    };
    for handle in handles {
      if let Err(e) = handle.await {
        warn!(error = %e, "Check-up delivery task aborted");
      }
    }
  }
}

impl Notifier for WebhookNotifier {
  fn send_checkup_message(&self, patient_id: i64, text: &str) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
      warn!(patient_id, "No async runtime available; check-up message dropped");
      return;
    };

    let client = self.client.clone();
    let url = self.url.clone();
    let text = text.to_string();
    let task = handle.spawn(async move {
      match post_checkup(&client, &url, patient_id, &text).await {
        Ok(()) => info!(patient_id, "Check-up message delivered"),
        Err(e) => warn!(patient_id, error = %e, "Check-up message delivery failed"),
      }
    });

    if let Ok(mut pending) = self.pending.lock() {
      pending.retain(|h| !h.is_finished());
      pending.push(task);
    }
  }
}

/// Writes messages to the log instead of sending them
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn send_checkup_message(&self, patient_id: i64, text: &str) {
    info!(patient_id, message = text, "Check-up message");
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
