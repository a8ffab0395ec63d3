// escrow/src/token/service.rs

//! Issues, consumes and invalidates callback tokens.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{event, instrument, Level};
use uuid::Uuid;

use crate::error::{EscrowError, EscrowResult};
use crate::order::OrderId;
use crate::store::TokenStore;
use crate::token::{Action, CallbackData, CallbackToken, TokenPayload};

#[derive(Clone)]
pub struct TokenService {
  store: Arc<dyn TokenStore>,
}

impl TokenService {
  pub fn new(store: Arc<dyn TokenStore>) -> Self {
    Self { store }
  }

  /// Persists `payload` under a fresh bearer token and returns the button callback data.
  #[instrument(name = "TokenService::create", skip_all, fields(action = %payload.action(), order_id = payload.order_id()), err(Display))]
  pub async fn create(&self, payload: &TokenPayload) -> EscrowResult<CallbackData> {
    let token = Uuid::new_v4().simple().to_string();
    self.persist(&token, payload).await?;
    event!(Level::DEBUG, "Token issued.");
    Ok(CallbackData::new(payload.action(), token))
  }

  /// Puts a consumed token back under its original string, so the button still on
  /// screen works again. Used when nothing replacing that button could be shown.
  #[instrument(name = "TokenService::restore", skip(self, callback, payload), fields(action = %callback.action, order_id = payload.order_id()), err(Display))]
  pub async fn restore(&self, callback: &CallbackData, payload: &TokenPayload) -> EscrowResult<()> {
    if callback.action != payload.action() {
      return Err(EscrowError::Internal(format!(
        "cannot restore a '{}' payload under a '{}' button",
        payload.action(),
        callback.action
      )));
    }
    self.persist(&callback.token, payload).await?;
    event!(Level::INFO, "Consumed token restored.");
    Ok(())
  }

  async fn persist(&self, token: &str, payload: &TokenPayload) -> EscrowResult<()> {
    self
      .store
      .insert(CallbackToken {
        token: token.to_string(),
        action: payload.action(),
        order_id: payload.order_id(),
        payload: payload.encode()?,
        created_at: Utc::now(),
      })
      .await
  }

  /// Like [`TokenService::create`], but a store failure degrades to an inert button
  /// (callback data pointing at a token that was never persisted) instead of failing the render.
  pub async fn create_or_inert(&self, payload: &TokenPayload) -> CallbackData {
    match self.create(payload).await {
      Ok(data) => data,
      Err(e) => {
        event!(
          Level::ERROR,
          action = %payload.action(),
          order_id = payload.order_id(),
          error = %e,
          "Token not persisted; rendering an inert button."
        );
        CallbackData::new(payload.action(), Uuid::new_v4().simple().to_string())
      }
    }
  }

  /// Deletes the token and returns its payload. The only way to read a payload.
  ///
  /// Unknown, already consumed or wrong-action tokens all yield `Invalid`.
  #[instrument(name = "TokenService::consume", skip(self, token), fields(action = %expected), err(Display))]
  pub async fn consume(&self, token: &str, expected: Action) -> EscrowResult<TokenPayload> {
    let row = self
      .store
      .consume(token, expected)
      .await?
      .ok_or_else(|| EscrowError::invalid(format!("no live '{}' token matched", expected)))?;
    let payload = TokenPayload::decode(row.action, &row.payload)?;
    if payload.order_id() != row.order_id {
      return Err(EscrowError::Internal(format!(
        "token payload names order {} but row names order {}",
        payload.order_id(),
        row.order_id
      )));
    }
    Ok(payload)
  }

  pub async fn delete_by_action_and_order_id(&self, action: Action, order_id: OrderId) -> EscrowResult<u64> {
    let removed = self.store.delete_by_action_and_order(action, order_id).await?;
    if removed > 0 {
      event!(Level::DEBUG, %action, order_id, removed, "Sibling tokens invalidated.");
    }
    Ok(removed)
  }

  /// Invalidates every outstanding token in `action`'s sibling family for the order.
  pub async fn invalidate_siblings(&self, action: Action, order_id: OrderId) -> EscrowResult<u64> {
    let mut removed = 0;
    for sibling in action.siblings() {
      removed += self.delete_by_action_and_order_id(*sibling, order_id).await?;
    }
    Ok(removed)
  }

  /// Drops tokens older than `ttl` (branches nobody ever resolved).
  #[instrument(name = "TokenService::purge_expired", skip(self), err(Display))]
  pub async fn purge_expired(&self, ttl: Duration) -> EscrowResult<u64> {
    let removed = self.store.delete_created_before(Utc::now() - ttl).await?;
    if removed > 0 {
      event!(Level::INFO, removed, "Expired tokens purged.");
    }
    Ok(removed)
  }
}
