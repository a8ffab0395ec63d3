// escrow_app/src/services/mod.rs

pub mod chat_log;
pub mod dispatcher;
pub mod token_sweeper;
