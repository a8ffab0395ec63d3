// escrow/src/order/mod.rs

//! Order records and the transition table of the escrow state machine.
//!
//! ```text
//! new ──accept──▶ accepted ──expert_confirm──▶ expert_confirmed ──complete──▶ completed
//!  │                 │
//!  └──cancel──▶ canceled   └──decline──▶ declined
//! ```
//!
//! Every mutation is a [`Transition`]: a declared prior status and a new status,
//! applied by the store as a single compare-and-swap.

pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EscrowError;

pub use service::OrderService;

pub type OrderId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  New,
  Accepted,
  ExpertConfirmed,
  Completed,
  Canceled,
  Declined,
}

impl OrderStatus {
  pub const ACTIVE: [OrderStatus; 3] = [OrderStatus::New, OrderStatus::Accepted, OrderStatus::ExpertConfirmed];

  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::New => "new",
      OrderStatus::Accepted => "accepted",
      OrderStatus::ExpertConfirmed => "expert_confirmed",
      OrderStatus::Completed => "completed",
      OrderStatus::Canceled => "canceled",
      OrderStatus::Declined => "declined",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, OrderStatus::Completed | OrderStatus::Canceled | OrderStatus::Declined)
  }

  pub fn is_active(&self) -> bool {
    !self.is_terminal()
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OrderStatus {
  type Err = EscrowError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "new" => Ok(OrderStatus::New),
      "accepted" => Ok(OrderStatus::Accepted),
      "expert_confirmed" => Ok(OrderStatus::ExpertConfirmed),
      "completed" => Ok(OrderStatus::Completed),
      "canceled" => Ok(OrderStatus::Canceled),
      "declined" => Ok(OrderStatus::Declined),
      other => Err(EscrowError::Internal(format!("unknown order status '{}'", other))),
    }
  }
}

/// One escrow transaction between a buyer and an expert for a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
  pub id: OrderId,
  pub client_id: i64,
  pub client_chat_id: i64,
  pub expert_id: Option<i64>,
  pub status: OrderStatus,
  /// Expert-side conversation thread, set once an expert is assigned.
  pub thread_id: Option<i64>,
  /// Catalog snapshots taken at purchase time.
  pub game_name: String,
  pub category: String,
  pub rating: Option<u8>,
  /// Opaque handle support uses to search for the order.
  pub lookup_token: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Row to insert for a freshly placed order. Always starts in [`OrderStatus::New`].
#[derive(Debug, Clone)]
pub struct NewOrder {
  pub client_id: i64,
  pub client_chat_id: i64,
  pub game_name: String,
  pub category: String,
  pub lookup_token: String,
  pub created_at: DateTime<Utc>,
}

/// Columns written by a guarded transition. `None` leaves the column untouched.
///
/// A `Some` rating is only written where the stored rating is still unset; stores
/// fold that into the conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
  pub status: OrderStatus,
  pub expert_id: Option<i64>,
  pub thread_id: Option<i64>,
  pub rating: Option<u8>,
  pub updated_at: DateTime<Utc>,
}

impl OrderUpdate {
  pub fn status(status: OrderStatus) -> Self {
    Self {
      status,
      expert_id: None,
      thread_id: None,
      rating: None,
      updated_at: Utc::now(),
    }
  }

  pub fn with_expert(mut self, expert_id: i64) -> Self {
    self.expert_id = Some(expert_id);
    self
  }

  pub fn with_thread(mut self, thread_id: i64) -> Self {
    self.thread_id = Some(thread_id);
    self
  }

  pub fn with_rating(mut self, rating: u8) -> Self {
    self.rating = Some(rating);
    self
  }
}

/// A named guarded transition: applied only if the persisted status equals `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  pub name: &'static str,
  pub from: OrderStatus,
  pub to: OrderStatus,
}

impl Transition {
  pub const ACCEPT: Transition = Transition {
    name: "accept",
    from: OrderStatus::New,
    to: OrderStatus::Accepted,
  };
  pub const ASSIGN_THREAD: Transition = Transition {
    name: "assign_thread",
    from: OrderStatus::Accepted,
    to: OrderStatus::Accepted,
  };
  pub const EXPERT_CONFIRM: Transition = Transition {
    name: "expert_confirm",
    from: OrderStatus::Accepted,
    to: OrderStatus::ExpertConfirmed,
  };
  pub const COMPLETE: Transition = Transition {
    name: "complete",
    from: OrderStatus::ExpertConfirmed,
    to: OrderStatus::Completed,
  };
  pub const CANCEL: Transition = Transition {
    name: "cancel",
    from: OrderStatus::New,
    to: OrderStatus::Canceled,
  };
  pub const DECLINE: Transition = Transition {
    name: "decline",
    from: OrderStatus::Accepted,
    to: OrderStatus::Declined,
  };
  pub const RATE: Transition = Transition {
    name: "rate",
    from: OrderStatus::Completed,
    to: OrderStatus::Completed,
  };

  pub const ALL: [Transition; 7] = [
    Transition::ACCEPT,
    Transition::ASSIGN_THREAD,
    Transition::EXPERT_CONFIRM,
    Transition::COMPLETE,
    Transition::CANCEL,
    Transition::DECLINE,
    Transition::RATE,
  ];
}
