// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use escrow::{
  Button, CallbackEvent, Coordinator, Destination, EscrowResult, EscrowServices, Expert, FlowOutcome, FlowSettings,
  Game, Keyboard, MemoryOrderStore, MemoryTokenStore, MessageRef, Notifier, Order, OrderService, PlaceOrder,
  ReferenceCache, RetryPolicy, StaticReferenceSource, SupportContact, TokenService, Transport, TransportError,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

// --- Fixture data ---
pub const GAME_ID: i64 = 7;
pub const CATEGORY: &str = "boosting";
pub const BUYER_ID: i64 = 11;
pub const BUYER_CHAT: i64 = 111;
pub const EXPERT_1: i64 = 1;
pub const EXPERT_1_CHAT: i64 = 501;
pub const EXPERT_2: i64 = 2;
pub const EXPERT_2_CHAT: i64 = 502;
pub const EXPERTS_CHAT: i64 = -1000;
pub const SUPPORT_CHAT: i64 = 900;

pub fn reference_source() -> StaticReferenceSource {
  StaticReferenceSource {
    games: vec![Game {
      id: GAME_ID,
      name: "Starfall".into(),
      categories: vec![CATEGORY.into(), "coaching".into()],
    }],
    experts: vec![
      Expert {
        id: EXPERT_1,
        chat_id: EXPERT_1_CHAT,
        display_name: "Ann".into(),
      },
      Expert {
        id: EXPERT_2,
        chat_id: EXPERT_2_CHAT,
        display_name: "Bob".into(),
      },
    ],
    support: Some(SupportContact {
      chat_id: SUPPORT_CHAT,
      handle: "@support".into(),
    }),
  }
}

// --- Recording transport ---
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
  Message {
    dest: Destination,
    message: MessageRef,
    text: String,
    buttons: Vec<Button>,
  },
  Edit {
    message: MessageRef,
    text: String,
    buttons: Vec<Button>,
  },
  Delete(MessageRef),
  Answer {
    event_id: String,
  },
  Subchannel {
    parent: i64,
    title: String,
    thread_id: i64,
  },
}

fn flatten(keyboard: Option<&Keyboard>) -> Vec<Button> {
  keyboard.map(|rows| rows.iter().flatten().cloned().collect()).unwrap_or_default()
}

/// Records every outbound call. `fail_all` and `rate_limits_left` apply to every call
/// kind; `fail_edits` and `fail_answers` to one each.
#[derive(Debug, Default)]
pub struct RecordingTransport {
  log: Mutex<Vec<Sent>>,
  next_id: AtomicI64,
  pub fail_all: AtomicBool,
  pub fail_edits: AtomicBool,
  pub fail_answers: AtomicBool,
  pub rate_limits_left: AtomicU32,
  pub calls: AtomicU32,
}

impl RecordingTransport {
  fn gate(&self) -> Result<(), TransportError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_all.load(Ordering::SeqCst) {
      return Err(TransportError::Failed("502 bad gateway".into()));
    }
    let limited = self
      .rate_limits_left
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if limited {
      return Err(TransportError::RateLimited {
        retry_after: Duration::from_millis(1),
      });
    }
    Ok(())
  }

  fn next_id(&self) -> i64 {
    self.next_id.fetch_add(1, Ordering::SeqCst) + 1
  }

  pub fn log(&self) -> Vec<Sent> {
    self.log.lock().clone()
  }

  pub fn answers(&self) -> usize {
    self.log().iter().filter(|s| matches!(s, Sent::Answer { .. })).count()
  }

  pub fn subchannels(&self) -> Vec<i64> {
    self
      .log()
      .iter()
      .filter_map(|s| match s {
        Sent::Subchannel { thread_id, .. } => Some(*thread_id),
        _ => None,
      })
      .collect()
  }

  /// Texts of messages sent (not edited) to `chat_id`.
  pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
    self
      .log()
      .iter()
      .filter_map(|s| match s {
        Sent::Message { dest, text, .. } if dest.chat_id == chat_id => Some(text.clone()),
        _ => None,
      })
      .collect()
  }

  /// Most recently rendered button with `label` in `chat_id`, with the message holding it.
  pub fn find_button(&self, chat_id: i64, label: &str) -> Option<(MessageRef, Button)> {
    self.log().iter().rev().find_map(|s| {
      let (message, buttons) = match s {
        Sent::Message { message, buttons, .. } => (message, buttons),
        Sent::Edit { message, buttons, .. } => (message, buttons),
        _ => return None,
      };
      if message.chat_id != chat_id {
        return None;
      }
      buttons
        .iter()
        .find(|b| b.text == label)
        .map(|b| (*message, b.clone()))
    })
  }
}

#[async_trait]
impl Transport for RecordingTransport {
  async fn send_message(
    &self,
    dest: Destination,
    text: &str,
    keyboard: Option<&Keyboard>,
  ) -> Result<MessageRef, TransportError> {
    self.gate()?;
    let message = MessageRef {
      chat_id: dest.chat_id,
      message_id: self.next_id(),
    };
    self.log.lock().push(Sent::Message {
      dest,
      message,
      text: text.to_string(),
      buttons: flatten(keyboard),
    });
    Ok(message)
  }

  async fn edit_message(&self, message: MessageRef, text: &str, keyboard: Option<&Keyboard>) -> Result<(), TransportError> {
    if self.fail_edits.load(Ordering::SeqCst) {
      return Err(TransportError::Failed("message can't be edited".into()));
    }
    self.gate()?;
    self.log.lock().push(Sent::Edit {
      message,
      text: text.to_string(),
      buttons: flatten(keyboard),
    });
    Ok(())
  }

  async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError> {
    self.gate()?;
    self.log.lock().push(Sent::Delete(message));
    Ok(())
  }

  async fn answer_event(&self, event_id: &str, _toast: Option<&str>) -> Result<(), TransportError> {
    if self.fail_answers.load(Ordering::SeqCst) {
      return Err(TransportError::Failed("query is too old".into()));
    }
    self.gate()?;
    self.log.lock().push(Sent::Answer {
      event_id: event_id.to_string(),
    });
    Ok(())
  }

  async fn create_subchannel(&self, parent_chat: i64, title: &str) -> Result<i64, TransportError> {
    self.gate()?;
    let thread_id = 10_000 + self.next_id();
    self.log.lock().push(Sent::Subchannel {
      parent: parent_chat,
      title: title.to_string(),
      thread_id,
    });
    Ok(thread_id)
  }
}

pub fn fast_retry() -> RetryPolicy {
  RetryPolicy {
    max_attempts: 3,
    base_delay: Duration::from_millis(1),
    max_delay: Duration::from_millis(5),
  }
}

// --- Harness ---
pub struct Harness {
  pub coordinator: Arc<Coordinator>,
  pub orders: Arc<MemoryOrderStore>,
  pub tokens: Arc<MemoryTokenStore>,
  pub transport: Arc<RecordingTransport>,
  events: AtomicI64,
}

pub async fn harness() -> Harness {
  setup_tracing();
  let orders = Arc::new(MemoryOrderStore::new());
  let tokens = Arc::new(MemoryTokenStore::new());
  let transport = Arc::new(RecordingTransport::default());
  let catalog = Arc::new(ReferenceCache::load(&reference_source()).await.unwrap());

  let services = EscrowServices {
    orders: OrderService::new(orders.clone(), catalog.clone()),
    tokens: TokenService::new(tokens.clone()),
    notifier: Notifier::new(transport.clone(), fast_retry()),
    catalog,
    settings: FlowSettings {
      experts_chat_id: EXPERTS_CHAT,
    },
  };
  let coordinator = Arc::new(Coordinator::with_default_flows(services).unwrap());

  Harness {
    coordinator,
    orders,
    tokens,
    transport,
    events: AtomicI64::new(0),
  }
}

impl Harness {
  pub async fn place_order(&self) -> Order {
    self
      .coordinator
      .place_order(PlaceOrder {
        client_id: BUYER_ID,
        client_chat_id: BUYER_CHAT,
        game_id: GAME_ID,
        category: CATEGORY.into(),
      })
      .await
      .unwrap()
  }

  pub async fn order(&self, id: i64) -> Order {
    self.coordinator.services().orders.get_by_id(id).await.unwrap()
  }

  /// Builds the event a press of `label` in `chat_id` would deliver. Panics if no such button was rendered.
  pub fn event_for(&self, chat_id: i64, label: &str) -> CallbackEvent {
    let (message, button) = self
      .transport
      .find_button(chat_id, label)
      .unwrap_or_else(|| panic!("no '{}' button rendered in chat {}", label, chat_id));
    self.raw_event(message, &button.callback_data)
  }

  pub fn raw_event(&self, message: MessageRef, data: &str) -> CallbackEvent {
    let n = self.events.fetch_add(1, Ordering::SeqCst) + 1;
    CallbackEvent {
      event_id: format!("evt-{}", n),
      user_id: message.chat_id,
      chat_id: message.chat_id,
      message_id: message.message_id,
      data: data.to_string(),
    }
  }

  pub async fn press(&self, chat_id: i64, label: &str) -> EscrowResult<FlowOutcome> {
    let event = self.event_for(chat_id, label);
    self.coordinator.dispatch(event).await
  }

  /// The thread opened for the most recent accept.
  pub fn expert_thread(&self) -> i64 {
    *self.transport.subchannels().last().expect("no expert thread opened")
  }
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
