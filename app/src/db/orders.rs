// escrow_app/src/db/orders.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow::{EscrowError, EscrowResult, NewOrder, Order, OrderId, OrderStatus, OrderStore, OrderUpdate};
use sqlx::{FromRow, PgPool};
use tracing::instrument;

use crate::db::store_error;

const ORDER_COLUMNS: &str = "id, client_id, client_chat_id, expert_id, status, thread_id, game_name, category, \
                             rating, lookup_token, created_at, updated_at";

#[derive(Debug, FromRow)]
struct OrderRow {
  id: i64,
  client_id: i64,
  client_chat_id: i64,
  expert_id: Option<i64>,
  status: String,
  thread_id: Option<i64>,
  game_name: String,
  category: String,
  rating: Option<i16>,
  lookup_token: String,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
  type Error = EscrowError;

  fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
    let rating = row
      .rating
      .map(u8::try_from)
      .transpose()
      .map_err(|_| EscrowError::Internal(format!("order {} has out-of-range rating", row.id)))?;
    Ok(Order {
      id: row.id,
      client_id: row.client_id,
      client_chat_id: row.client_chat_id,
      expert_id: row.expert_id,
      status: row.status.parse::<OrderStatus>()?,
      thread_id: row.thread_id,
      game_name: row.game_name,
      category: row.category,
      rating,
      lookup_token: row.lookup_token,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

#[derive(Debug, Clone)]
pub struct PgOrderStore {
  pool: PgPool,
}

impl PgOrderStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  async fn fetch_one_where(&self, op: &'static str, clause: &str, bind: i64) -> EscrowResult<Option<Order>> {
    let sql = format!("SELECT {} FROM orders WHERE {}", ORDER_COLUMNS, clause);
    sqlx::query_as::<_, OrderRow>(&sql)
      .bind(bind)
      .fetch_optional(&self.pool)
      .await
      .map_err(store_error(op))?
      .map(Order::try_from)
      .transpose()
  }
}

#[async_trait]
impl OrderStore for PgOrderStore {
  #[instrument(name = "PgOrderStore::insert", skip_all, fields(client_id = order.client_id))]
  async fn insert(&self, order: NewOrder) -> EscrowResult<Order> {
    let sql = format!(
      "INSERT INTO orders (client_id, client_chat_id, status, game_name, category, lookup_token, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $7) RETURNING {}",
      ORDER_COLUMNS
    );
    let row = sqlx::query_as::<_, OrderRow>(&sql)
      .bind(order.client_id)
      .bind(order.client_chat_id)
      .bind(OrderStatus::New.as_str())
      .bind(order.game_name)
      .bind(order.category)
      .bind(order.lookup_token)
      .bind(order.created_at)
      .fetch_one(&self.pool)
      .await
      .map_err(store_error("insert order"))?;
    Order::try_from(row)
  }

  async fn get_by_id(&self, id: OrderId) -> EscrowResult<Option<Order>> {
    self.fetch_one_where("get order", "id = $1", id).await
  }

  async fn get_active_by_client(&self, client_id: i64) -> EscrowResult<Vec<Order>> {
    let sql = format!(
      "SELECT {} FROM orders WHERE client_id = $1 AND status = ANY($2) ORDER BY created_at DESC, id DESC",
      ORDER_COLUMNS
    );
    let active: Vec<&str> = OrderStatus::ACTIVE.iter().map(|s| s.as_str()).collect();
    let rows = sqlx::query_as::<_, OrderRow>(&sql)
      .bind(client_id)
      .bind(active)
      .fetch_all(&self.pool)
      .await
      .map_err(store_error("list active orders"))?;
    rows.into_iter().map(Order::try_from).collect()
  }

  async fn get_active_by_thread(&self, thread_id: i64) -> EscrowResult<Option<Order>> {
    self
      .fetch_one_where(
        "get order by thread",
        "thread_id = $1 AND status NOT IN ('completed', 'canceled', 'declined') ORDER BY id DESC LIMIT 1",
        thread_id,
      )
      .await
  }

  async fn get_by_lookup_token(&self, lookup_token: &str) -> EscrowResult<Option<Order>> {
    let sql = format!("SELECT {} FROM orders WHERE lookup_token = $1", ORDER_COLUMNS);
    sqlx::query_as::<_, OrderRow>(&sql)
      .bind(lookup_token)
      .fetch_optional(&self.pool)
      .await
      .map_err(store_error("get order by lookup token"))?
      .map(Order::try_from)
      .transpose()
  }

  #[instrument(name = "PgOrderStore::update_if_status", skip(self, update), fields(to = %update.status))]
  async fn update_if_status(&self, id: OrderId, expected: OrderStatus, update: &OrderUpdate) -> EscrowResult<u64> {
    let result = sqlx::query(
      r#"
      UPDATE orders SET
        status = $3,
        expert_id = COALESCE($4, expert_id),
        thread_id = COALESCE($5, thread_id),
        rating = COALESCE($6, rating),
        updated_at = $7
      WHERE id = $1 AND status = $2 AND ($6::SMALLINT IS NULL OR rating IS NULL)
      "#,
    )
    .bind(id)
    .bind(expected.as_str())
    .bind(update.status.as_str())
    .bind(update.expert_id)
    .bind(update.thread_id)
    .bind(update.rating.map(i16::from))
    .bind(update.updated_at)
    .execute(&self.pool)
    .await
    .map_err(store_error("conditional order update"))?;
    Ok(result.rows_affected())
  }
}
