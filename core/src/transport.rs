// escrow/src/transport.rs

//! The chat-platform seam and the retrying [`Notifier`] flows talk through.
//!
//! Every call made here happens after the order write has committed. A failure is
//! logged by the caller and never causes the store transition to be re-issued.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{event, Level};

use crate::error::{EscrowError, EscrowResult};
use crate::token::CallbackData;

/// A chat, optionally narrowed to a sub-channel (thread) inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
  pub chat_id: i64,
  pub thread_id: Option<i64>,
}

impl Destination {
  pub fn chat(chat_id: i64) -> Self {
    Self {
      chat_id,
      thread_id: None,
    }
  }

  pub fn thread(chat_id: i64, thread_id: i64) -> Self {
    Self {
      chat_id,
      thread_id: Some(thread_id),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
  pub chat_id: i64,
  pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
  pub text: String,
  pub callback_data: String,
}

impl Button {
  pub fn new(text: impl Into<String>, data: &CallbackData) -> Self {
    Self {
      text: text.into(),
      callback_data: data.render(),
    }
  }
}

/// Rows of buttons.
pub type Keyboard = Vec<Vec<Button>>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
  #[error("rate limited, retry after {retry_after:?}")]
  RateLimited { retry_after: Duration },

  #[error("transport failure: {0}")]
  Failed(String),
}

impl TransportError {
  fn into_escrow(self, op: &str) -> EscrowError {
    match self {
      TransportError::RateLimited { retry_after } => {
        EscrowError::Unavailable(format!("{} still rate limited (retry after {:?})", op, retry_after))
      }
      TransportError::Failed(msg) => EscrowError::External(format!("{}: {}", op, msg)),
    }
  }
}

#[async_trait]
pub trait Transport: Send + Sync {
  async fn send_message(
    &self,
    dest: Destination,
    text: &str,
    keyboard: Option<&Keyboard>,
  ) -> Result<MessageRef, TransportError>;

  async fn edit_message(&self, message: MessageRef, text: &str, keyboard: Option<&Keyboard>) -> Result<(), TransportError>;

  async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError>;

  /// Acknowledges an inbound button event, optionally with a short toast.
  async fn answer_event(&self, event_id: &str, toast: Option<&str>) -> Result<(), TransportError>;

  /// Opens a thread under `parent_chat` and returns its id.
  async fn create_subchannel(&self, parent_chat: i64, title: &str) -> Result<i64, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      base_delay: Duration::from_millis(500),
      max_delay: Duration::from_secs(30),
    }
  }
}

impl RetryPolicy {
  /// A rate limit waits exactly what the platform asked for; other failures back off exponentially.
  pub fn delay_for(&self, attempt: u32, err: &TransportError) -> Duration {
    let delay = match err {
      TransportError::RateLimited { retry_after } => *retry_after,
      TransportError::Failed(_) => {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
      }
    };
    delay.min(self.max_delay)
  }
}

/// Outbound side of the flows: a [`Transport`] plus at-least-once retry.
#[derive(Clone)]
pub struct Notifier {
  transport: Arc<dyn Transport>,
  policy: RetryPolicy,
}

impl Notifier {
  pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
    Self { transport, policy }
  }

  pub async fn send(&self, dest: Destination, text: &str, keyboard: Option<Keyboard>) -> EscrowResult<MessageRef> {
    let transport = &self.transport;
    let keyboard = keyboard.as_ref();
    self
      .retry("send_message", move || transport.send_message(dest, text, keyboard))
      .await
  }

  pub async fn edit(&self, message: MessageRef, text: &str, keyboard: Option<Keyboard>) -> EscrowResult<()> {
    let transport = &self.transport;
    let keyboard = keyboard.as_ref();
    self
      .retry("edit_message", move || transport.edit_message(message, text, keyboard))
      .await
  }

  pub async fn delete(&self, message: MessageRef) -> EscrowResult<()> {
    let transport = &self.transport;
    self.retry("delete_message", move || transport.delete_message(message)).await
  }

  pub async fn create_subchannel(&self, parent_chat: i64, title: &str) -> EscrowResult<i64> {
    let transport = &self.transport;
    self
      .retry("create_subchannel", move || transport.create_subchannel(parent_chat, title))
      .await
  }

  /// Single attempt: a late acknowledgement is worthless, so it is not retried.
  pub async fn answer(&self, event_id: &str, toast: Option<&str>) -> EscrowResult<()> {
    self
      .transport
      .answer_event(event_id, toast)
      .await
      .map_err(|e| e.into_escrow("answer_event"))
  }

  async fn retry<T, F, Fut>(&self, op: &'static str, call: F) -> EscrowResult<T>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
  {
    let mut attempt = 0u32;
    loop {
      attempt += 1;
      match call().await {
        Ok(value) => return Ok(value),
        Err(err) if attempt >= self.policy.max_attempts => {
          event!(Level::WARN, op, attempt, error = %err, "Outbound call gave up.");
          return Err(err.into_escrow(op));
        }
        Err(err) => {
          let delay = self.policy.delay_for(attempt, &err);
          event!(Level::DEBUG, op, attempt, ?delay, error = %err, "Outbound call failed; deferring retry.");
          tokio::time::sleep(delay).await;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rate_limit_delay_is_honoured_but_capped() {
    let policy = RetryPolicy {
      max_attempts: 3,
      base_delay: Duration::from_millis(100),
      max_delay: Duration::from_secs(5),
    };
    let limited = TransportError::RateLimited {
      retry_after: Duration::from_secs(2),
    };
    assert_eq!(policy.delay_for(1, &limited), Duration::from_secs(2));
    let long = TransportError::RateLimited {
      retry_after: Duration::from_secs(60),
    };
    assert_eq!(policy.delay_for(1, &long), Duration::from_secs(5));
  }

  #[test]
  fn generic_failures_back_off_exponentially() {
    let policy = RetryPolicy {
      max_attempts: 10,
      base_delay: Duration::from_millis(100),
      max_delay: Duration::from_millis(1000),
    };
    let failed = TransportError::Failed("502".into());
    assert_eq!(policy.delay_for(1, &failed), Duration::from_millis(100));
    assert_eq!(policy.delay_for(3, &failed), Duration::from_millis(400));
    assert_eq!(policy.delay_for(8, &failed), Duration::from_millis(1000));
  }
}
