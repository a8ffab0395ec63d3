// escrow_core/examples/escrow_walkthrough.rs

//! One order from placement to rating, on in-memory stores and a console transport.

use async_trait::async_trait;
use escrow::{
  CallbackEvent, Coordinator, Destination, EscrowError, EscrowServices, Expert, FlowSettings, Game, Keyboard,
  MemoryOrderStore, MemoryTokenStore, MessageRef, Notifier, OrderService, PlaceOrder, ReferenceCache, RetryPolicy,
  StaticReferenceSource, SupportContact, TokenService, Transport, TransportError,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Prints every outbound call and remembers the last keyboard per chat so the walkthrough can "press" it.
#[derive(Default)]
struct ConsoleTransport {
  next_id: AtomicI64,
  last_keyboard: Mutex<Vec<(MessageRef, Keyboard)>>,
}

impl ConsoleTransport {
  fn press(&self, chat_id: i64, label: &str) -> Option<CallbackEvent> {
    let keyboards = self.last_keyboard.lock();
    keyboards.iter().rev().find_map(|(message, keyboard)| {
      if message.chat_id != chat_id {
        return None;
      }
      keyboard.iter().flatten().find(|b| b.text == label).map(|b| CallbackEvent {
        event_id: format!("evt-{}", b.callback_data),
        user_id: chat_id,
        chat_id,
        message_id: message.message_id,
        data: b.callback_data.clone(),
      })
    })
  }

  fn remember(&self, message: MessageRef, keyboard: Option<&Keyboard>) {
    if let Some(keyboard) = keyboard {
      self.last_keyboard.lock().push((message, keyboard.clone()));
    }
  }
}

#[async_trait]
impl Transport for ConsoleTransport {
  async fn send_message(
    &self,
    dest: Destination,
    text: &str,
    keyboard: Option<&Keyboard>,
  ) -> Result<MessageRef, TransportError> {
    let message = MessageRef {
      chat_id: dest.chat_id,
      message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
    };
    info!(chat = dest.chat_id, thread = ?dest.thread_id, "send: {}", text);
    self.remember(message, keyboard);
    Ok(message)
  }

  async fn edit_message(&self, message: MessageRef, text: &str, keyboard: Option<&Keyboard>) -> Result<(), TransportError> {
    info!(chat = message.chat_id, message = message.message_id, "edit: {}", text);
    self.remember(message, keyboard);
    Ok(())
  }

  async fn delete_message(&self, _message: MessageRef) -> Result<(), TransportError> {
    Ok(())
  }

  async fn answer_event(&self, _event_id: &str, _toast: Option<&str>) -> Result<(), TransportError> {
    Ok(())
  }

  async fn create_subchannel(&self, parent_chat: i64, title: &str) -> Result<i64, TransportError> {
    info!(parent_chat, "thread opened: {}", title);
    Ok(9001)
  }
}

#[tokio::main]
async fn main() -> Result<(), EscrowError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  let source = StaticReferenceSource {
    games: vec![Game {
      id: 1,
      name: "Starfall".into(),
      categories: vec!["boosting".into()],
    }],
    experts: vec![Expert {
      id: 5,
      chat_id: 500,
      display_name: "Ann".into(),
    }],
    support: Some(SupportContact {
      chat_id: 900,
      handle: "@support".into(),
    }),
  };
  let catalog = Arc::new(ReferenceCache::load(&source).await?);
  let transport = Arc::new(ConsoleTransport::default());
  let services = EscrowServices {
    orders: OrderService::new(Arc::new(MemoryOrderStore::new()), catalog.clone()),
    tokens: TokenService::new(Arc::new(MemoryTokenStore::new())),
    notifier: Notifier::new(transport.clone(), RetryPolicy::default()),
    catalog,
    settings: FlowSettings { experts_chat_id: -100 },
  };
  let coordinator = Coordinator::with_default_flows(services)?;

  let order = coordinator
    .place_order(PlaceOrder {
      client_id: 1,
      client_chat_id: 100,
      game_id: 1,
      category: "boosting".into(),
    })
    .await?;

  let presses = [
    (500, "Take order"),
    (-100, "Work done"),
    (-100, "Yes, done"),
    (100, "I received it, release payment"),
    (100, "5★"),
    // A second tap on an already spent rating button changes nothing.
    (100, "4★"),
  ];
  for (chat_id, label) in presses {
    let Some(event) = transport.press(chat_id, label) else {
      info!("no '{}' button in chat {}", label, chat_id);
      continue;
    };
    let outcome = coordinator.dispatch(event).await?;
    info!(?outcome, "pressed '{}'", label);
  }

  let order = coordinator.services().orders.get_by_id(order.id).await?;
  info!(status = %order.status, rating = ?order.rating, "Final order state.");
  Ok(())
}
