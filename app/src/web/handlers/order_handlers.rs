// escrow_app/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use escrow::PlaceOrder;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
  pub client_id: i64,
  pub client_chat_id: i64,
  pub game_id: i64,
  pub category: String,
}

#[instrument(
  name = "handler::place_order",
  skip(app_state, req),
  fields(client_id = req.client_id, game_id = req.game_id)
)]
pub async fn place_order_handler(
  app_state: web::Data<AppState>,
  req: web::Json<PlaceOrderRequest>,
) -> Result<HttpResponse, AppError> {
  let req = req.into_inner();
  if req.category.trim().is_empty() {
    return Err(AppError::Validation("category must not be empty".to_string()));
  }

  let order = app_state
    .coordinator
    .place_order(PlaceOrder {
      client_id: req.client_id,
      client_chat_id: req.client_chat_id,
      game_id: req.game_id,
      category: req.category,
    })
    .await?;
  info!(order_id = order.id, "Order placed.");
  Ok(HttpResponse::Created().json(order))
}

/// Support search by the order's lookup token.
#[instrument(name = "handler::lookup_order", skip(app_state, token))]
pub async fn lookup_order_handler(
  app_state: web::Data<AppState>,
  token: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .coordinator
    .services()
    .orders
    .find_by_lookup_token(&token.into_inner())
    .await?;
  Ok(HttpResponse::Ok().json(order))
}
