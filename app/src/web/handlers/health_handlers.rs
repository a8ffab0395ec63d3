// escrow_app/src/web/handlers/health_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::errors::AppError;
use crate::state::AppState;

pub async fn health_check_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  sqlx::query("SELECT 1").execute(&app_state.db_pool).await?;
  Ok(HttpResponse::Ok().json(json!({
    "status": "ok",
    "games": app_state.coordinator.services().catalog.games().len(),
    "experts": app_state.coordinator.services().catalog.experts().len(),
    "token_ttl_hours": app_state.config.token_ttl.map(|ttl| ttl.num_hours()),
  })))
}
