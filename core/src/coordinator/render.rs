// escrow/src/coordinator/render.rs

//! Outbound messages after a committed transition, and the re-render of the expert's
//! choice for presses that change nothing.
//!
//! A failed send or edit here is logged and dropped: the order state is already
//! committed, and the affected party can recover visibility through the status and
//! lookup read paths.

use tracing::{event, Level};

use crate::coordinator::{keyboards, CallbackEvent, EscrowServices};
use crate::error::{EscrowError, EscrowResult};
use crate::order::{Order, OrderId, OrderStatus};
use crate::token::{AcceptPayload, TokenPayload};
use crate::transport::{Destination, MessageRef};

fn log_failure<T>(what: &'static str, order_id: OrderId, result: EscrowResult<T>) -> Option<T> {
  match result {
    Ok(value) => Some(value),
    Err(e) => {
      event!(Level::ERROR, order_id, error = %e, "Notification step '{}' failed after commit.", what);
      None
    }
  }
}

fn summary(order: &Order) -> String {
  format!("Order #{} · {} · {}", order.id, order.game_name, order.category)
}

/// Loads the order a just-consumed token referred to. A miss here is a data-integrity problem.
async fn load_order(services: &EscrowServices, order_id: OrderId) -> EscrowResult<Order> {
  services.orders.get_by_id(order_id).await.map_err(|e| {
    if e.is_not_found() {
      event!(Level::ERROR, order_id, "Order referenced by a consumed token does not exist.");
    }
    e
  })
}

/// First branch point of a fresh order: accept offers to every expert, cancel for the buyer.
pub async fn order_placed(services: &EscrowServices, order: &Order) {
  let text = format!("New {}. Take it?", summary(order));
  let experts = services.catalog.experts();
  if experts.is_empty() {
    event!(Level::WARN, order_id = order.id, "No experts loaded; nobody can accept this order.");
  }
  for expert in experts {
    let keyboard = keyboards::accept(&services.tokens, order.id, expert.id, expert.chat_id).await;
    log_failure(
      "offer to expert",
      order.id,
      services
        .notifier
        .send(Destination::chat(expert.chat_id), &text, Some(keyboard))
        .await,
    );
  }

  let keyboard = keyboards::cancel(&services.tokens, order.id, order.client_chat_id).await;
  log_failure(
    "buyer receipt",
    order.id,
    services
      .notifier
      .send(
        Destination::chat(order.client_chat_id),
        &format!("{} placed. Waiting for an expert.", summary(order)),
        Some(keyboard),
      )
      .await,
  );
}

pub async fn after_transition(services: &EscrowServices, event: &CallbackEvent, payload: &TokenPayload) -> EscrowResult<()> {
  let order = load_order(services, payload.order_id()).await?;
  let clicked = MessageRef {
    chat_id: event.chat_id,
    message_id: event.message_id,
  };
  let notifier = &services.notifier;
  let tokens = &services.tokens;

  match payload {
    TokenPayload::Accept(p) => accepted(services, &order, p, clicked).await,
    TokenPayload::Cancel(_) => {
      log_failure(
        "edit canceled",
        order.id,
        notifier.edit(clicked, &format!("{} canceled.", summary(&order)), None).await,
      );
    }
    TokenPayload::Confirm(_) | TokenPayload::Decline(_) | TokenPayload::ReaffirmBack(_) => {
      return Err(EscrowError::Internal(format!(
        "'{}' commits no transition; its flow renders through `choice`",
        payload.action()
      )));
    }
    TokenPayload::ConfirmedReaffirm(_) => {
      log_failure(
        "edit confirmed",
        order.id,
        notifier
          .edit(clicked, &format!("{}: marked done, waiting for the buyer.", summary(&order)), None)
          .await,
      );
      let keyboard = keyboards::verify(tokens, order.id, order.client_chat_id).await;
      log_failure(
        "ask buyer to verify",
        order.id,
        notifier
          .send(
            Destination::chat(order.client_chat_id),
            &format!("{}: the expert reports the work is done.", summary(&order)),
            Some(keyboard),
          )
          .await,
      );
    }
    TokenPayload::DeclinedReaffirm(_) => declined(services, &order, clicked).await,
    TokenPayload::Verify(_) => {
      let keyboard = keyboards::rating(tokens, order.id).await;
      log_failure(
        "edit completed",
        order.id,
        notifier
          .edit(clicked, &format!("{} completed. How did it go?", summary(&order)), Some(keyboard))
          .await,
      );
      if let Some(thread_id) = order.thread_id {
        log_failure(
          "tell expert",
          order.id,
          notifier
            .send(
              Destination::thread(services.settings.experts_chat_id, thread_id),
              "The buyer confirmed. Payment released.",
              None,
            )
            .await,
        );
      }
    }
    TokenPayload::Rate(p) => {
      log_failure(
        "edit rated",
        order.id,
        notifier
          .edit(clicked, &format!("Thanks! You rated {} with {}★.", summary(&order), p.rate), None)
          .await,
      );
    }
  }
  Ok(())
}

/// How a render-only press ended on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceRender {
  /// The next keyboard is visible, in place or as a fresh message.
  Shown,
  /// The order already left `accepted`; there is no choice left to render.
  Closed,
  /// Neither the edit nor the fallback send went through.
  Failed,
}

/// Swaps the expert's choice for its next step: "are you sure" after "Work done" or
/// "Decline", the choice again after "Back".
///
/// A failed edit falls back to sending the keyboard as a new message in the order
/// thread, then removes the stale message.
pub async fn choice(services: &EscrowServices, event: &CallbackEvent, payload: &TokenPayload) -> EscrowResult<ChoiceRender> {
  let order = load_order(services, payload.order_id()).await?;
  if order.status != OrderStatus::Accepted {
    event!(Level::INFO, order_id = order.id, status = %order.status, "Choice no longer open; not re-rendering.");
    return Ok(ChoiceRender::Closed);
  }

  let tokens = &services.tokens;
  let (text, keyboard) = match payload {
    TokenPayload::Confirm(p) => (
      format!("{}: confirm the work is done?", summary(&order)),
      keyboards::reaffirm(tokens, TokenPayload::ConfirmedReaffirm(p.clone()), "Yes, done", order.id, p.expert_id).await,
    ),
    TokenPayload::Decline(p) => (
      format!("{}: decline this order?", summary(&order)),
      keyboards::reaffirm(tokens, TokenPayload::DeclinedReaffirm(p.clone()), "Yes, decline", order.id, p.expert_id).await,
    ),
    TokenPayload::ReaffirmBack(p) => (thread_prompt(&order), keyboards::choice(tokens, order.id, p.expert_id).await),
    other => {
      return Err(EscrowError::Internal(format!(
        "'{}' is not a render-only action",
        other.action()
      )))
    }
  };

  let notifier = &services.notifier;
  let clicked = MessageRef {
    chat_id: event.chat_id,
    message_id: event.message_id,
  };
  let edit_err = match notifier.edit(clicked, &text, Some(keyboard.clone())).await {
    Ok(()) => return Ok(ChoiceRender::Shown),
    Err(e) => e,
  };
  event!(Level::WARN, order_id = order.id, error = %edit_err, "Editing the choice failed; sending it as a new message.");

  let dest = match order.thread_id {
    Some(thread_id) => Destination::thread(services.settings.experts_chat_id, thread_id),
    None => Destination::chat(event.chat_id),
  };
  match notifier.send(dest, &text, Some(keyboard)).await {
    Ok(_) => {
      log_failure("remove stale choice", order.id, notifier.delete(clicked).await);
      Ok(ChoiceRender::Shown)
    }
    Err(e) => {
      log_failure::<()>("resend choice", order.id, Err(e));
      Ok(ChoiceRender::Failed)
    }
  }
}

fn thread_prompt(order: &Order) -> String {
  format!("{}. Press \"Work done\" when finished.", summary(order))
}

async fn accepted(services: &EscrowServices, order: &Order, p: &AcceptPayload, clicked: MessageRef) {
  let notifier = &services.notifier;
  let parent = services.settings.experts_chat_id;

  match notifier.create_subchannel(parent, &summary(order)).await {
    Ok(thread_id) => {
      match services.orders.assign_thread(order.id, thread_id).await {
        Ok(()) => {}
        Err(e) if e.is_benign() => {
          event!(Level::INFO, order_id = order.id, reason = %e, "Order left 'accepted' before its thread was assigned.")
        }
        Err(e) => {
          event!(Level::ERROR, order_id = order.id, error = %e, "Assigning the expert thread failed.")
        }
      }
      let keyboard = keyboards::choice(&services.tokens, order.id, p.expert_id).await;
      log_failure(
        "thread prompt",
        order.id,
        notifier
          .send(Destination::thread(parent, thread_id), &thread_prompt(order), Some(keyboard))
          .await,
      );
    }
    Err(e) => {
      log_failure::<()>("open expert thread", order.id, Err(e));
    }
  }

  log_failure(
    "edit accepted",
    order.id,
    notifier
      .edit(clicked, &format!("You took {}.", summary(order)), None)
      .await,
  );

  let expert_name = services
    .catalog
    .expert(p.expert_id)
    .map(|e| e.display_name.clone())
    .unwrap_or_else(|| format!("expert {}", p.expert_id));
  log_failure(
    "tell buyer",
    order.id,
    notifier
      .send(
        Destination::chat(order.client_chat_id),
        &format!("{} was taken by {}.", summary(order), expert_name),
        None,
      )
      .await,
  );
}

async fn declined(services: &EscrowServices, order: &Order, clicked: MessageRef) {
  let notifier = &services.notifier;
  log_failure(
    "edit declined",
    order.id,
    notifier
      .edit(clicked, &format!("You declined {}.", summary(order)), None)
      .await,
  );
  log_failure(
    "tell buyer",
    order.id,
    notifier
      .send(
        Destination::chat(order.client_chat_id),
        &format!("{} was declined by the expert. Support will contact you.", summary(order)),
        None,
      )
      .await,
  );
  match services.catalog.support() {
    Some(support) => {
      log_failure(
        "tell support",
        order.id,
        notifier
          .send(
            Destination::chat(support.chat_id),
            &format!("{} declined. Lookup token: {}", summary(order), order.lookup_token),
            None,
          )
          .await,
      );
    }
    None => {
      let err = EscrowError::not_found("support contact");
      event!(Level::WARN, order_id = order.id, error = %err, "Declined order not escalated.");
    }
  }
}
