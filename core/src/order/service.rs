// escrow/src/order/service.rs

//! Named, guarded order transitions on top of [`OrderStore::update_if_status`].

use chrono::Utc;
use std::sync::Arc;
use tracing::{event, instrument, Level};
use uuid::Uuid;

use crate::catalog::ReferenceCache;
use crate::error::{EscrowError, EscrowResult};
use crate::order::{NewOrder, Order, OrderId, OrderStatus, OrderUpdate, Transition};
use crate::store::OrderStore;

#[derive(Clone)]
pub struct OrderService {
  store: Arc<dyn OrderStore>,
  catalog: Arc<ReferenceCache>,
}

impl OrderService {
  pub fn new(store: Arc<dyn OrderStore>, catalog: Arc<ReferenceCache>) -> Self {
    Self { store, catalog }
  }

  /// Places a new order, snapshotting the catalog entry the buyer picked.
  #[instrument(name = "OrderService::create", skip(self), err(Display))]
  pub async fn create(&self, client_id: i64, client_chat_id: i64, game_id: i64, category: &str) -> EscrowResult<Order> {
    let game = self
      .catalog
      .game(game_id)
      .ok_or_else(|| EscrowError::not_found(format!("game {}", game_id)))?;
    if !game.offers(category) {
      return Err(EscrowError::invalid(format!(
        "game '{}' does not offer category '{}'",
        game.name, category
      )));
    }

    let order = self
      .store
      .insert(NewOrder {
        client_id,
        client_chat_id,
        game_name: game.name.clone(),
        category: category.to_string(),
        lookup_token: Uuid::new_v4().simple().to_string(),
        created_at: Utc::now(),
      })
      .await?;
    event!(Level::INFO, order_id = order.id, client_id, game = %order.game_name, "Order created.");
    Ok(order)
  }

  pub async fn get_by_id(&self, id: OrderId) -> EscrowResult<Order> {
    self
      .store
      .get_by_id(id)
      .await?
      .ok_or_else(|| EscrowError::not_found(format!("order {}", id)))
  }

  pub async fn get_active_by_client(&self, client_id: i64) -> EscrowResult<Vec<Order>> {
    self.store.get_active_by_client(client_id).await
  }

  pub async fn get_active_by_thread(&self, thread_id: i64) -> EscrowResult<Order> {
    self
      .store
      .get_active_by_thread(thread_id)
      .await?
      .ok_or_else(|| EscrowError::not_found(format!("active order for thread {}", thread_id)))
  }

  /// Support search path.
  pub async fn find_by_lookup_token(&self, lookup_token: &str) -> EscrowResult<Order> {
    self
      .store
      .get_by_lookup_token(lookup_token)
      .await?
      .ok_or_else(|| EscrowError::not_found(format!("order with lookup token '{}'", lookup_token)))
  }

  /// Expert takes the order: `new -> accepted`, recording the expert in the same write.
  pub async fn accept(&self, id: OrderId, expert_id: i64) -> EscrowResult<()> {
    self
      .apply(id, Transition::ACCEPT, OrderUpdate::status(OrderStatus::Accepted).with_expert(expert_id))
      .await
  }

  /// Attribute-only update once the expert thread exists.
  pub async fn assign_thread(&self, id: OrderId, thread_id: i64) -> EscrowResult<()> {
    self
      .apply(id, Transition::ASSIGN_THREAD, OrderUpdate::status(OrderStatus::Accepted).with_thread(thread_id))
      .await
  }

  pub async fn expert_confirm(&self, id: OrderId) -> EscrowResult<()> {
    self
      .apply(id, Transition::EXPERT_CONFIRM, OrderUpdate::status(OrderStatus::ExpertConfirmed))
      .await
  }

  /// Buyer confirms payment.
  pub async fn complete(&self, id: OrderId) -> EscrowResult<()> {
    self
      .apply(id, Transition::COMPLETE, OrderUpdate::status(OrderStatus::Completed))
      .await
  }

  /// Buyer withdraws before any expert took the order.
  pub async fn cancel(&self, id: OrderId) -> EscrowResult<()> {
    self
      .apply(id, Transition::CANCEL, OrderUpdate::status(OrderStatus::Canceled))
      .await
  }

  pub async fn decline(&self, id: OrderId) -> EscrowResult<()> {
    self
      .apply(id, Transition::DECLINE, OrderUpdate::status(OrderStatus::Declined))
      .await
  }

  pub async fn rate(&self, id: OrderId, rate: u8) -> EscrowResult<()> {
    if !(1..=5).contains(&rate) {
      return Err(EscrowError::invalid(format!("rating {} outside 1..=5", rate)));
    }
    self
      .apply(id, Transition::RATE, OrderUpdate::status(OrderStatus::Completed).with_rating(rate))
      .await
  }

  /// Issues the single conditional write for `transition`.
  ///
  /// Zero rows means another event already moved the order; the write is never retried.
  #[instrument(
    name = "OrderService::apply",
    skip(self, update),
    fields(transition = transition.name, from = %transition.from, to = %transition.to)
  )]
  async fn apply(&self, id: OrderId, transition: Transition, update: OrderUpdate) -> EscrowResult<()> {
    if update.status != transition.to {
      return Err(EscrowError::Internal(format!(
        "update for '{}' targets {} instead of {}",
        transition.name, update.status, transition.to
      )));
    }

    let affected = self.store.update_if_status(id, transition.from, &update).await?;
    match affected {
      1 => {
        event!(Level::INFO, order_id = id, "Transition committed.");
        Ok(())
      }
      0 => {
        event!(Level::INFO, order_id = id, "Guarded write matched no row; already processed.");
        Err(EscrowError::AlreadyProcessed {
          order_id: id,
          transition: transition.name,
        })
      }
      n => {
        event!(Level::ERROR, order_id = id, affected = n, "Guarded write touched more than one row.");
        Err(EscrowError::Internal(format!(
          "transition '{}' on order {} affected {} rows",
          transition.name, id, n
        )))
      }
    }
  }
}
