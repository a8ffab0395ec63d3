// escrow_app/src/services/chat_log.rs

//! A `Transport` that only logs. Stands in for the chat-platform client, whose wire
//! protocol lives outside this service.

use async_trait::async_trait;
use escrow::{Destination, Keyboard, MessageRef, Transport, TransportError};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default)]
pub struct LoggingTransport {
  next_id: AtomicI64,
}

impl LoggingTransport {
  pub fn new() -> Self {
    Self::default()
  }

  fn next_id(&self) -> i64 {
    self.next_id.fetch_add(1, Ordering::Relaxed) + 1
  }
}

fn describe(keyboard: Option<&Keyboard>) -> Vec<String> {
  keyboard
    .map(|rows| rows.iter().flatten().map(|b| format!("[{}] {}", b.text, b.callback_data)).collect())
    .unwrap_or_default()
}

#[async_trait]
impl Transport for LoggingTransport {
  async fn send_message(
    &self,
    dest: Destination,
    text: &str,
    keyboard: Option<&Keyboard>,
  ) -> Result<MessageRef, TransportError> {
    tokio::time::sleep(Duration::from_millis(5)).await; // Simulate network latency
    let message = MessageRef {
      chat_id: dest.chat_id,
      message_id: self.next_id(),
    };
    info!(
      chat_id = dest.chat_id,
      thread_id = ?dest.thread_id,
      message_id = message.message_id,
      buttons = ?describe(keyboard),
      "send_message: {}",
      text
    );
    Ok(message)
  }

  async fn edit_message(&self, message: MessageRef, text: &str, keyboard: Option<&Keyboard>) -> Result<(), TransportError> {
    info!(
      chat_id = message.chat_id,
      message_id = message.message_id,
      buttons = ?describe(keyboard),
      "edit_message: {}",
      text
    );
    Ok(())
  }

  async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError> {
    info!(chat_id = message.chat_id, message_id = message.message_id, "delete_message");
    Ok(())
  }

  async fn answer_event(&self, event_id: &str, toast: Option<&str>) -> Result<(), TransportError> {
    info!(event_id, toast = ?toast, "answer_event");
    Ok(())
  }

  async fn create_subchannel(&self, parent_chat: i64, title: &str) -> Result<i64, TransportError> {
    let thread_id = self.next_id();
    info!(parent_chat, thread_id, "create_subchannel: {}", title);
    Ok(thread_id)
  }
}
