// escrow_app/src/db/schema.rs

use sqlx::PgPool;
use tracing::info;

const STATEMENTS: [&str; 9] = [
  r#"
  CREATE TABLE IF NOT EXISTS games (
    id BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    categories TEXT[] NOT NULL DEFAULT '{}'
  );
  "#,
  r#"
  CREATE TABLE IF NOT EXISTS experts (
    id BIGINT PRIMARY KEY,
    chat_id BIGINT NOT NULL,
    display_name TEXT NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE
  );
  "#,
  r#"
  CREATE TABLE IF NOT EXISTS support_contact (
    id SERIAL PRIMARY KEY,
    chat_id BIGINT NOT NULL,
    handle TEXT NOT NULL
  );
  "#,
  r#"
  CREATE TABLE IF NOT EXISTS orders (
    id BIGSERIAL PRIMARY KEY,
    client_id BIGINT NOT NULL,
    client_chat_id BIGINT NOT NULL,
    expert_id BIGINT,
    status TEXT NOT NULL CHECK (status IN ('new', 'accepted', 'expert_confirmed', 'completed', 'canceled', 'declined')),
    thread_id BIGINT,
    game_name TEXT NOT NULL,
    category TEXT NOT NULL,
    rating SMALLINT CHECK (rating BETWEEN 1 AND 5),
    lookup_token TEXT NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
  );
  "#,
  r#"CREATE INDEX IF NOT EXISTS orders_client_status ON orders(client_id, status);"#,
  r#"CREATE INDEX IF NOT EXISTS orders_thread_id ON orders(thread_id) WHERE thread_id IS NOT NULL;"#,
  r#"
  CREATE TABLE IF NOT EXISTS callback_tokens (
    token TEXT PRIMARY KEY,
    action TEXT NOT NULL,
    order_id BIGINT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
    payload TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
  );
  "#,
  r#"CREATE INDEX IF NOT EXISTS callback_tokens_action_order ON callback_tokens(action, order_id);"#,
  r#"CREATE INDEX IF NOT EXISTS callback_tokens_created_at ON callback_tokens(created_at);"#,
];

/// Idempotent: every statement is `IF NOT EXISTS`.
pub async fn initialize(pool: &PgPool) -> Result<(), sqlx::Error> {
  for stmt in STATEMENTS {
    sqlx::query(stmt).execute(pool).await?;
  }
  info!("Database schema ready.");
  Ok(())
}
