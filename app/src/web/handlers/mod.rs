// escrow_app/src/web/handlers/mod.rs

pub mod event_handlers;
pub mod health_handlers;
pub mod order_handlers;
