// escrow/src/flow/execution.rs

//! `TransitionFlow::run()`: walks the declared stages and applies the race policy.
//!
//! - `Invalid` / `AlreadyProcessed` from a handler end the run as [`FlowOutcome::Benign`]
//!   (info log, nothing surfaced).
//! - Any other error is logged at error level and returned; no later stage runs, so no
//!   partial UI update follows a failed write.

use crate::core::context_data::ContextData;
use crate::core::control::{FlowOutcome, StageControl};
use crate::error::{EscrowError, EscrowResult};
use crate::flow::definition::TransitionFlow;
use tracing::{event, instrument, span, Instrument, Level};

impl<TData> TransitionFlow<TData>
where
  TData: 'static + Send + Sync,
{
  #[instrument(
    name = "TransitionFlow::run",
    skip_all,
    fields(action = %self.action, num_stages = self.stages.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> EscrowResult<FlowOutcome> {
    event!(Level::DEBUG, "Flow run starting.");

    for def in &self.stages {
      let stage = def.stage;
      let handlers = match self.handlers.get(&stage) {
        Some(handlers) if !handlers.is_empty() => handlers,
        _ if def.optional => {
          event!(Level::DEBUG, %stage, "Optional stage has no handlers, skipping.");
          continue;
        }
        _ => {
          event!(Level::ERROR, %stage, "Required stage has no handlers.");
          return Err(EscrowError::Configuration {
            flow: self.action.to_string(),
            message: format!("required stage '{}' has no handlers", stage),
          });
        }
      };

      let stage_span = span!(Level::INFO, "flow_stage", stage = stage.as_str());
      for (handler_idx, handler_fn) in handlers.iter().enumerate() {
        let result = handler_fn(ctx_data.clone())
          .instrument(span!(parent: &stage_span, Level::DEBUG, "stage_handler", handler_index = handler_idx))
          .await;
        match result {
          Ok(StageControl::Continue) => {}
          Ok(StageControl::Halt) => {
            event!(Level::INFO, %stage, "Flow halted by handler.");
            return Ok(FlowOutcome::Halted { stage });
          }
          Err(e) if e.is_benign() => {
            event!(Level::INFO, %stage, reason = %e, "Flow stopped on benign race outcome.");
            return Ok(FlowOutcome::Benign {
              stage,
              reason: e.to_string(),
            });
          }
          Err(e) => {
            event!(Level::ERROR, %stage, error = %e, "Stage handler failed.");
            return Err(e);
          }
        }
      }
    }

    event!(Level::DEBUG, "Flow run completed.");
    Ok(FlowOutcome::Completed)
  }
}
