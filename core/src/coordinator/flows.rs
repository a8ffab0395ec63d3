// escrow/src/coordinator/flows.rs

//! Flow definitions per action.

use crate::coordinator::{steps, EventCtxData};
use crate::core::stage::Stage;
use crate::flow::TransitionFlow;
use crate::token::Action;

/// Whether taking `action` writes the order, or only re-renders a choice.
pub fn changes_state(action: Action) -> bool {
  match action {
    Action::Accept
    | Action::Cancel
    | Action::ConfirmedReaffirm
    | Action::DeclinedReaffirm
    | Action::Verify
    | Action::Rate => true,
    Action::Confirm | Action::Decline | Action::ReaffirmBack => false,
  }
}

/// Builds the flow for `action`.
///
/// Render-only actions declare neither `Invalidate` nor `Transition`: their `Notify`
/// stage invalidates siblings itself, after the replacement keyboard is on screen.
pub fn build(action: Action) -> TransitionFlow<EventCtxData> {
  let writes = changes_state(action);
  let mut stages = vec![(Stage::Acknowledge, false), (Stage::Consume, false), (Stage::Notify, false)];
  if writes {
    stages.push((Stage::Invalidate, false));
    stages.push((Stage::Transition, false));
  }

  let mut flow = TransitionFlow::<EventCtxData>::new(action, &stages);
  flow.on_stage(Stage::Acknowledge, steps::acknowledge);
  flow.on_stage(Stage::Consume, steps::consume);
  if writes {
    flow.on_stage(Stage::Invalidate, steps::invalidate_siblings);
    flow.on_stage(Stage::Transition, steps::transition);
    flow.on_stage(Stage::Notify, steps::notify);
  } else {
    flow.on_stage(Stage::Notify, steps::rerender_choice);
  }
  flow
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_action_builds_a_valid_flow() {
    for action in Action::ALL {
      let flow = build(action);
      assert_eq!(flow.action(), action);
      assert!(flow.validate().is_ok(), "{} flow invalid", action);
      assert_eq!(flow.declares(Stage::Transition), changes_state(action));
      assert_eq!(flow.declares(Stage::Invalidate), changes_state(action));
    }
  }
}
