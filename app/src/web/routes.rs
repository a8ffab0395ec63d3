// escrow_app/src/web/routes.rs

use actix_web::web;

use crate::web::handlers::{event_handlers, health_handlers, order_handlers};

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg
    .route("/health", web::get().to(health_handlers::health_check_handler))
    // Chat-platform ingress: button presses
    .service(web::scope("/events").route("/callback", web::post().to(event_handlers::callback_handler)))
    .service(
      web::scope("/orders")
        .route("", web::post().to(order_handlers::place_order_handler))
        .route("/lookup/{token}", web::get().to(order_handlers::lookup_order_handler)),
    );
}
