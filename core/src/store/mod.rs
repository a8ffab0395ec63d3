// escrow/src/store/mod.rs

//! Persistence seams for orders and callback tokens.
//!
//! Correctness of the whole workflow rests on two store primitives, not on
//! application locks:
//! - [`OrderStore::update_if_status`]: a conditional write returning the affected-row count.
//! - [`TokenStore::consume`]: an atomic delete-and-return.
//!
//! Implementations must report "nothing matched" through the return value
//! (`0` / `None`), and reserve `Err` for the query itself failing.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EscrowResult;
use crate::order::{NewOrder, Order, OrderId, OrderStatus, OrderUpdate};
use crate::token::{Action, CallbackToken};

pub use memory::{MemoryOrderStore, MemoryTokenStore};

#[async_trait]
pub trait OrderStore: Send + Sync {
  async fn insert(&self, order: NewOrder) -> EscrowResult<Order>;

  /// `Ok(None)` when no row has this id.
  async fn get_by_id(&self, id: OrderId) -> EscrowResult<Option<Order>>;

  /// Non-terminal orders placed by a client, newest first.
  async fn get_active_by_client(&self, client_id: i64) -> EscrowResult<Vec<Order>>;

  async fn get_active_by_thread(&self, thread_id: i64) -> EscrowResult<Option<Order>>;

  async fn get_by_lookup_token(&self, lookup_token: &str) -> EscrowResult<Option<Order>>;

  /// `UPDATE orders SET .. WHERE id = $id AND status = $expected` (and `rating IS NULL`
  /// when the update carries a rating). Returns the number of rows written.
  async fn update_if_status(&self, id: OrderId, expected: OrderStatus, update: &OrderUpdate) -> EscrowResult<u64>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
  /// Fails with `Conflict` if the token string already exists.
  async fn insert(&self, token: CallbackToken) -> EscrowResult<()>;

  /// Deletes the row matching `(token, action)` and returns it, or `None` if nothing matched.
  async fn consume(&self, token: &str, action: Action) -> EscrowResult<Option<CallbackToken>>;

  async fn delete_by_action_and_order(&self, action: Action, order_id: OrderId) -> EscrowResult<u64>;

  async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> EscrowResult<u64>;
}
