// escrow/src/coordinator/steps.rs

//! Stage handlers shared by every flow. Each reads what it needs out of the context,
//! drops the guard, then awaits.

use tracing::{event, Level};

use crate::coordinator::render::{self, ChoiceRender};
use crate::coordinator::EventCtxData;
use crate::core::context_data::ContextData;
use crate::core::control::StageControl;
use crate::error::EscrowResult;
use crate::token::{Action, TokenPayload};

/// Acknowledges the event. Independent of the business outcome, so a failure here is only logged.
pub async fn acknowledge(ctx: ContextData<EventCtxData>) -> EscrowResult<StageControl> {
  let (notifier, event_id) = ctx.with(|d| (d.services.notifier.clone(), d.event.event_id.clone()));
  if let Err(e) = notifier.answer(&event_id, None).await {
    event!(Level::WARN, %event_id, error = %e, "Acknowledgement failed.");
  }
  Ok(StageControl::Continue)
}

/// Consumes the clicked token. An unknown or spent token is `Invalid` and ends the run benignly.
pub async fn consume(ctx: ContextData<EventCtxData>) -> EscrowResult<StageControl> {
  let (tokens, callback) = ctx.with(|d| (d.services.tokens.clone(), d.callback.clone()));
  let payload = tokens.consume(&callback.token, callback.action).await?;
  event!(Level::DEBUG, action = %callback.action, order_id = payload.order_id(), "Token consumed.");
  ctx.update(|d| d.payload = Some(payload));
  Ok(StageControl::Continue)
}

/// Kills the sibling branches before the guarded write, so a competing button pressed in
/// the race window is already inert. State-changing flows only.
pub async fn invalidate_siblings(ctx: ContextData<EventCtxData>) -> EscrowResult<StageControl> {
  let (tokens, payload) = ctx.with(|d| (d.services.tokens.clone(), d.payload()));
  let payload = payload?;
  tokens.invalidate_siblings(payload.action(), payload.order_id()).await?;
  Ok(StageControl::Continue)
}

/// The guarded order write for the consumed payload.
pub async fn transition(ctx: ContextData<EventCtxData>) -> EscrowResult<StageControl> {
  let (orders, payload) = ctx.with(|d| (d.services.orders.clone(), d.payload()));
  match payload? {
    TokenPayload::Accept(p) => orders.accept(p.order_id, p.expert_id).await?,
    TokenPayload::Cancel(p) => orders.cancel(p.order_id).await?,
    TokenPayload::ConfirmedReaffirm(p) => orders.expert_confirm(p.order_id).await?,
    TokenPayload::DeclinedReaffirm(p) => orders.decline(p.order_id).await?,
    TokenPayload::Verify(p) => orders.complete(p.order_id).await?,
    TokenPayload::Rate(p) => orders.rate(p.order_id, p.rate).await?,
    // Render-only branches: no state change.
    TokenPayload::Confirm(_) | TokenPayload::Decline(_) | TokenPayload::ReaffirmBack(_) => {}
  }
  Ok(StageControl::Continue)
}

/// Renders the next UI state. Runs only after the transition (if any) committed.
pub async fn notify(ctx: ContextData<EventCtxData>) -> EscrowResult<StageControl> {
  let (services, event, payload) = ctx.with(|d| (d.services.clone(), d.event.clone(), d.payload()));
  render::after_transition(&services, &event, &payload?).await?;
  Ok(StageControl::Continue)
}

/// Notify stage of render-only flows. Siblings die only once the replacement keyboard is
/// visible; when nothing could be shown, the pressed token goes back and the replacement
/// tokens nobody saw are dropped.
pub async fn rerender_choice(ctx: ContextData<EventCtxData>) -> EscrowResult<StageControl> {
  let (services, event, callback, payload) =
    ctx.with(|d| (d.services.clone(), d.event.clone(), d.callback.clone(), d.payload()));
  let payload = payload?;
  let order_id = payload.order_id();

  match render::choice(&services, &event, &payload).await? {
    ChoiceRender::Shown | ChoiceRender::Closed => {
      services.tokens.invalidate_siblings(payload.action(), order_id).await?;
    }
    ChoiceRender::Failed => {
      services.tokens.restore(&callback, &payload).await?;
      services
        .tokens
        .invalidate_siblings(replacement_family(payload.action()), order_id)
        .await?;
      event!(Level::WARN, order_id, action = %payload.action(), "Choice not shown; pressed button left live.");
    }
  }
  Ok(StageControl::Continue)
}

/// Family of the keyboard a render-only press replaces its own with.
fn replacement_family(pressed: Action) -> Action {
  match pressed {
    Action::Confirm | Action::Decline => Action::ReaffirmBack,
    _ => Action::Confirm,
  }
}
