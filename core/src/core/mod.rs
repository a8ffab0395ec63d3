pub mod context;
pub mod context_data;
pub mod control;
pub mod stage;

pub use context::Handler;
pub use context_data::ContextData;
pub use control::{FlowOutcome, StageControl};
pub use stage::{Stage, StageDef};
