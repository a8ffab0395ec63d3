// escrow/src/flow/definition.rs

//! The `TransitionFlow<TData>` struct: which stages a flow declares and the handlers
//! registered for each.

use crate::core::context::Handler;
use crate::core::context_data::ContextData;
use crate::core::control::StageControl;
use crate::core::stage::{Stage, StageDef};
use crate::error::{EscrowError, EscrowResult};
use crate::token::Action;
use std::collections::HashMap;
use std::future::Future;
use tracing::{event, Level};

/// The per-transition protocol for one [`Action`]: acknowledge, consume, invalidate,
/// transition, notify. Each flow differs only in its handlers.
pub struct TransitionFlow<TData>
where
  TData: 'static + Send + Sync,
{
  pub(crate) action: Action,
  /// Declared stages, kept in [`Stage::ORDERED`] order.
  pub(crate) stages: Vec<StageDef>,
  pub(crate) handlers: HashMap<Stage, Vec<Handler<TData>>>,
}

impl<TData> TransitionFlow<TData>
where
  TData: 'static + Send + Sync,
{
  /// Creates a flow declaring `(stage, optional)` pairs. Declaration order is ignored;
  /// stages always run in [`Stage::ORDERED`] order.
  pub fn new(action: Action, stage_defs: &[(Stage, bool)]) -> Self {
    let mut stages: Vec<StageDef> = Vec::with_capacity(stage_defs.len());
    for (stage, optional) in stage_defs {
      if stages.iter().any(|s| s.stage == *stage) {
        panic!("Flow setup error: stage '{}' declared twice for action '{}'.", stage, action);
      }
      stages.push(StageDef {
        stage: *stage,
        optional: *optional,
      });
    }
    stages.sort_by_key(|s| s.stage);

    Self {
      action,
      stages,
      handlers: HashMap::new(),
    }
  }

  pub fn action(&self) -> Action {
    self.action
  }

  pub fn declares(&self, stage: Stage) -> bool {
    self.stages.iter().any(|s| s.stage == stage)
  }

  /// Registers a handler for a declared stage. Handlers of one stage run in registration order.
  ///
  /// Panics if the stage was not declared: that is a wiring mistake, not a runtime condition.
  pub fn on_stage<F, UserErr>(&mut self, stage: Stage, handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<StageControl, UserErr>> + Send + 'static,
    UserErr: Into<EscrowError> + Send + Sync + 'static,
  {
    if !self.declares(stage) {
      panic!(
        "Flow setup error: stage '{}' is not declared for action '{}'.",
        stage, self.action
      );
    }
    let handler: Handler<TData> = Box::new(move |ctx_data| {
      let user_fut = handler_fn(ctx_data);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    });
    self.handlers.entry(stage).or_default().push(handler);
    event!(Level::TRACE, action = %self.action, %stage, "Stage handler registered.");
  }

  /// Startup-time check: every required stage has at least one handler.
  pub fn validate(&self) -> EscrowResult<()> {
    for def in &self.stages {
      let has_handlers = self.handlers.get(&def.stage).map_or(false, |v| !v.is_empty());
      if !has_handlers && !def.optional {
        return Err(EscrowError::Configuration {
          flow: self.action.to_string(),
          message: format!("required stage '{}' has no handlers", def.stage),
        });
      }
    }
    Ok(())
  }
}
