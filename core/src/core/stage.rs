// escrow/src/core/stage.rs

//! The fixed stages every transition flow walks through.

use std::fmt;

/// Stages in execution order. A flow declares the subset it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
  /// Answer the inbound event so the control never looks hung.
  Acknowledge,
  /// Consume the clicked token, recovering its payload.
  Consume,
  /// Delete outstanding tokens of the mutually exclusive branches.
  Invalidate,
  /// The guarded order write.
  Transition,
  /// Outbound messages and the next stage's buttons. Only reached after a commit.
  Notify,
}

impl Stage {
  pub const ORDERED: [Stage; 5] = [
    Stage::Acknowledge,
    Stage::Consume,
    Stage::Invalidate,
    Stage::Transition,
    Stage::Notify,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Stage::Acknowledge => "acknowledge",
      Stage::Consume => "consume",
      Stage::Invalidate => "invalidate",
      Stage::Transition => "transition",
      Stage::Notify => "notify",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A declared stage of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDef {
  pub stage: Stage,
  /// An optional stage with no handlers is skipped; a required one is a configuration error.
  pub optional: bool,
}
