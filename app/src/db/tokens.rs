// escrow_app/src/db/tokens.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow::{Action, CallbackToken, EscrowError, EscrowResult, OrderId, TokenStore};
use sqlx::{FromRow, PgPool};
use tracing::instrument;

use crate::db::store_error;

#[derive(Debug, FromRow)]
struct TokenRow {
  token: String,
  action: String,
  order_id: i64,
  payload: String,
  created_at: DateTime<Utc>,
}

impl TryFrom<TokenRow> for CallbackToken {
  type Error = EscrowError;

  fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
    let action = row
      .action
      .parse::<Action>()
      .map_err(|_| EscrowError::Internal(format!("stored token has unknown action '{}'", row.action)))?;
    Ok(CallbackToken {
      token: row.token,
      action,
      order_id: row.order_id,
      payload: row.payload,
      created_at: row.created_at,
    })
  }
}

#[derive(Debug, Clone)]
pub struct PgTokenStore {
  pool: PgPool,
}

impl PgTokenStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl TokenStore for PgTokenStore {
  async fn insert(&self, token: CallbackToken) -> EscrowResult<()> {
    sqlx::query("INSERT INTO callback_tokens (token, action, order_id, payload, created_at) VALUES ($1, $2, $3, $4, $5)")
      .bind(token.token)
      .bind(token.action.as_str())
      .bind(token.order_id)
      .bind(token.payload)
      .bind(token.created_at)
      .execute(&self.pool)
      .await
      .map_err(store_error("insert token"))?;
    Ok(())
  }

  /// Delete-and-return in one statement: of any number of concurrent callers, one gets the row.
  #[instrument(name = "PgTokenStore::consume", skip(self, token))]
  async fn consume(&self, token: &str, action: Action) -> EscrowResult<Option<CallbackToken>> {
    sqlx::query_as::<_, TokenRow>(
      "DELETE FROM callback_tokens WHERE token = $1 AND action = $2 \
       RETURNING token, action, order_id, payload, created_at",
    )
    .bind(token)
    .bind(action.as_str())
    .fetch_optional(&self.pool)
    .await
    .map_err(store_error("consume token"))?
    .map(CallbackToken::try_from)
    .transpose()
  }

  async fn delete_by_action_and_order(&self, action: Action, order_id: OrderId) -> EscrowResult<u64> {
    let result = sqlx::query("DELETE FROM callback_tokens WHERE action = $1 AND order_id = $2")
      .bind(action.as_str())
      .bind(order_id)
      .execute(&self.pool)
      .await
      .map_err(store_error("delete sibling tokens"))?;
    Ok(result.rows_affected())
  }

  async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> EscrowResult<u64> {
    let result = sqlx::query("DELETE FROM callback_tokens WHERE created_at < $1")
      .bind(cutoff)
      .execute(&self.pool)
      .await
      .map_err(store_error("purge expired tokens"))?;
    Ok(result.rows_affected())
  }
}
