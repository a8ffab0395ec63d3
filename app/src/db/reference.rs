// escrow_app/src/db/reference.rs

use async_trait::async_trait;
use escrow::{EscrowResult, Expert, Game, ReferenceSource, SupportContact};
use sqlx::{FromRow, PgPool};

use crate::db::store_error;

#[derive(Debug, FromRow)]
struct GameRow {
  id: i64,
  name: String,
  categories: Vec<String>,
}

#[derive(Debug, FromRow)]
struct ExpertRow {
  id: i64,
  chat_id: i64,
  display_name: String,
}

#[derive(Debug, FromRow)]
struct SupportRow {
  chat_id: i64,
  handle: String,
}

/// Loads the reference cache snapshot from the `games`, `experts` and `support_contact` tables.
#[derive(Debug, Clone)]
pub struct PgReferenceSource {
  pool: PgPool,
}

impl PgReferenceSource {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl ReferenceSource for PgReferenceSource {
  async fn load_games(&self) -> EscrowResult<Vec<Game>> {
    let rows = sqlx::query_as::<_, GameRow>("SELECT id, name, categories FROM games ORDER BY id")
      .fetch_all(&self.pool)
      .await
      .map_err(store_error("load games"))?;
    Ok(
      rows
        .into_iter()
        .map(|r| Game {
          id: r.id,
          name: r.name,
          categories: r.categories,
        })
        .collect(),
    )
  }

  /// Only active experts receive new-order offers.
  async fn load_experts(&self) -> EscrowResult<Vec<Expert>> {
    let rows = sqlx::query_as::<_, ExpertRow>("SELECT id, chat_id, display_name FROM experts WHERE active ORDER BY id")
      .fetch_all(&self.pool)
      .await
      .map_err(store_error("load experts"))?;
    Ok(
      rows
        .into_iter()
        .map(|r| Expert {
          id: r.id,
          chat_id: r.chat_id,
          display_name: r.display_name,
        })
        .collect(),
    )
  }

  async fn load_support(&self) -> EscrowResult<Option<SupportContact>> {
    let row = sqlx::query_as::<_, SupportRow>("SELECT chat_id, handle FROM support_contact ORDER BY id LIMIT 1")
      .fetch_optional(&self.pool)
      .await
      .map_err(store_error("load support contact"))?;
    Ok(row.map(|r| SupportContact {
      chat_id: r.chat_id,
      handle: r.handle,
    }))
  }
}
