// escrow/src/core/control.rs

//! Signals for controlling flow execution and the outcome of a flow run.

use crate::core::stage::Stage;

/// Returned by a stage handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageControl {
  /// Proceed to the next handler / stage.
  Continue,
  /// Stop the flow here. Later stages (in particular `Notify`) do not run.
  Halt,
}

/// Outcome of one flow run over one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
  /// Every declared stage ran.
  Completed,
  /// A handler returned [`StageControl::Halt`].
  Halted { stage: Stage },
  /// A stage hit an expected race outcome (consumed token, lost transition) and the
  /// flow stopped without surfacing anything to the user.
  Benign { stage: Stage, reason: String },
  /// The event itself was malformed (unparseable callback data); it was only acknowledged.
  Rejected { reason: String },
}

impl FlowOutcome {
  pub fn is_completed(&self) -> bool {
    matches!(self, FlowOutcome::Completed)
  }
}
