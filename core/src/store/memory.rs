// escrow/src/store/memory.rs

//! In-memory store implementations.
//!
//! Each method takes the lock once and performs its check-and-write inside it, so the
//! conditional update and the delete-and-return keep the same atomicity a SQL backend
//! gives. Used by tests and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::{EscrowError, EscrowResult};
use crate::order::{NewOrder, Order, OrderId, OrderStatus, OrderUpdate};
use crate::store::{OrderStore, TokenStore};
use crate::token::{Action, CallbackToken};

#[derive(Debug, Default)]
struct OrderTable {
  next_id: OrderId,
  rows: HashMap<OrderId, Order>,
}

#[derive(Debug, Default)]
pub struct MemoryOrderStore {
  table: Mutex<OrderTable>,
}

impl MemoryOrderStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of stored orders, terminal ones included.
  pub fn len(&self) -> usize {
    self.table.lock().rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
  async fn insert(&self, order: NewOrder) -> EscrowResult<Order> {
    let mut table = self.table.lock();
    if table.rows.values().any(|o| o.lookup_token == order.lookup_token) {
      return Err(EscrowError::Conflict(format!(
        "lookup token '{}' already in use",
        order.lookup_token
      )));
    }
    table.next_id += 1;
    let row = Order {
      id: table.next_id,
      client_id: order.client_id,
      client_chat_id: order.client_chat_id,
      expert_id: None,
      status: OrderStatus::New,
      thread_id: None,
      game_name: order.game_name,
      category: order.category,
      rating: None,
      lookup_token: order.lookup_token,
      created_at: order.created_at,
      updated_at: order.created_at,
    };
    table.rows.insert(row.id, row.clone());
    Ok(row)
  }

  async fn get_by_id(&self, id: OrderId) -> EscrowResult<Option<Order>> {
    Ok(self.table.lock().rows.get(&id).cloned())
  }

  async fn get_active_by_client(&self, client_id: i64) -> EscrowResult<Vec<Order>> {
    let table = self.table.lock();
    let mut active: Vec<Order> = table
      .rows
      .values()
      .filter(|o| o.client_id == client_id && o.status.is_active())
      .cloned()
      .collect();
    active.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(active)
  }

  async fn get_active_by_thread(&self, thread_id: i64) -> EscrowResult<Option<Order>> {
    Ok(
      self
        .table
        .lock()
        .rows
        .values()
        .find(|o| o.thread_id == Some(thread_id) && o.status.is_active())
        .cloned(),
    )
  }

  async fn get_by_lookup_token(&self, lookup_token: &str) -> EscrowResult<Option<Order>> {
    Ok(
      self
        .table
        .lock()
        .rows
        .values()
        .find(|o| o.lookup_token == lookup_token)
        .cloned(),
    )
  }

  async fn update_if_status(&self, id: OrderId, expected: OrderStatus, update: &OrderUpdate) -> EscrowResult<u64> {
    let mut table = self.table.lock();
    let Some(row) = table.rows.get_mut(&id) else {
      return Ok(0);
    };
    if row.status != expected || (update.rating.is_some() && row.rating.is_some()) {
      return Ok(0);
    }
    row.status = update.status;
    if let Some(expert_id) = update.expert_id {
      row.expert_id = Some(expert_id);
    }
    if let Some(thread_id) = update.thread_id {
      row.thread_id = Some(thread_id);
    }
    if let Some(rating) = update.rating {
      row.rating = Some(rating);
    }
    row.updated_at = update.updated_at;
    Ok(1)
  }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
  rows: Mutex<HashMap<String, CallbackToken>>,
}

impl MemoryTokenStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Outstanding tokens of one action for one order.
  pub fn outstanding(&self, action: Action, order_id: OrderId) -> usize {
    self
      .rows
      .lock()
      .values()
      .filter(|t| t.action == action && t.order_id == order_id)
      .count()
  }

  pub fn len(&self) -> usize {
    self.rows.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
  async fn insert(&self, token: CallbackToken) -> EscrowResult<()> {
    let mut rows = self.rows.lock();
    if rows.contains_key(&token.token) {
      return Err(EscrowError::Conflict(format!("token '{}' already exists", token.token)));
    }
    rows.insert(token.token.clone(), token);
    Ok(())
  }

  async fn consume(&self, token: &str, action: Action) -> EscrowResult<Option<CallbackToken>> {
    let mut rows = self.rows.lock();
    match rows.get(token) {
      Some(row) if row.action == action => Ok(rows.remove(token)),
      _ => Ok(None),
    }
  }

  async fn delete_by_action_and_order(&self, action: Action, order_id: OrderId) -> EscrowResult<u64> {
    let mut rows = self.rows.lock();
    let before = rows.len();
    rows.retain(|_, t| !(t.action == action && t.order_id == order_id));
    Ok((before - rows.len()) as u64)
  }

  async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> EscrowResult<u64> {
    let mut rows = self.rows.lock();
    let before = rows.len();
    rows.retain(|_, t| t.created_at >= cutoff);
    Ok((before - rows.len()) as u64)
  }
}
