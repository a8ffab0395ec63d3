// escrow_app/src/web/handlers/event_handlers.rs

use actix_web::{web, HttpResponse};
use escrow::CallbackEvent;
use tracing::instrument;

use crate::errors::AppError;
use crate::state::AppState;

/// Accepts a button press and returns at once; the flow runs on the dispatcher.
/// Duplicate deliveries are fine: the token store lets only one of them through.
#[instrument(
  name = "handler::callback",
  skip(app_state, event),
  fields(event_id = %event.event_id, user_id = event.user_id)
)]
pub async fn callback_handler(
  app_state: web::Data<AppState>,
  event: web::Json<CallbackEvent>,
) -> Result<HttpResponse, AppError> {
  app_state.dispatcher.submit(event.into_inner()).await?;
  Ok(HttpResponse::Accepted().finish())
}
