// escrow_app/src/db/mod.rs

//! PostgreSQL implementations of the escrow store and reference-source seams.

pub mod orders;
pub mod reference;
pub mod schema;
pub mod tokens;

pub use orders::PgOrderStore;
pub use reference::PgReferenceSource;
pub use tokens::PgTokenStore;

use escrow::EscrowError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::config::AppConfig;

pub async fn connect(config: &AppConfig) -> Result<PgPool, sqlx::Error> {
  PgPoolOptions::new()
    .max_connections(config.database_max_connections)
    .acquire_timeout(Duration::from_secs(5))
    .connect(&config.database_url)
    .await
}

/// Folds a driver error into the escrow taxonomy: connectivity is `Unavailable`,
/// a unique-key clash is `Conflict`, anything else is `Internal`.
pub(crate) fn store_error(op: &'static str) -> impl Fn(sqlx::Error) -> EscrowError {
  move |err| match &err {
    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
      EscrowError::Unavailable(format!("{}: {}", op, err))
    }
    sqlx::Error::Database(db) if db.is_unique_violation() => EscrowError::Conflict(format!("{}: {}", op, err)),
    _ => EscrowError::Internal(format!("{}: {}", op, err)),
  }
}
