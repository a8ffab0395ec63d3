// escrow_app/src/state.rs
use crate::config::AppConfig;
use crate::services::dispatcher::EventDispatcher;
use escrow::Coordinator;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub db_pool: PgPool,
  pub coordinator: Arc<Coordinator>,
  pub dispatcher: EventDispatcher,
  pub config: Arc<AppConfig>, // Share loaded config
}
