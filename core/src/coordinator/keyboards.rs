// escrow/src/coordinator/keyboards.rs

//! Token-backed keyboards for each branch point. Every button gets its own token.

use crate::order::OrderId;
use crate::token::{AcceptPayload, ClientPayload, ExpertPayload, RatePayload, TokenPayload, TokenService};
use crate::transport::{Button, Keyboard};

pub async fn accept(tokens: &TokenService, order_id: OrderId, expert_id: i64, expert_chat_id: i64) -> Keyboard {
  let data = tokens
    .create_or_inert(&TokenPayload::Accept(AcceptPayload {
      order_id,
      expert_id,
      expert_chat_id,
    }))
    .await;
  vec![vec![Button::new("Take order", &data)]]
}

pub async fn cancel(tokens: &TokenService, order_id: OrderId, client_chat_id: i64) -> Keyboard {
  let data = tokens
    .create_or_inert(&TokenPayload::Cancel(ClientPayload {
      order_id,
      client_chat_id,
    }))
    .await;
  vec![vec![Button::new("Cancel order", &data)]]
}

/// The expert's confirm / decline choice inside the order thread.
pub async fn choice(tokens: &TokenService, order_id: OrderId, expert_id: i64) -> Keyboard {
  let p = ExpertPayload { order_id, expert_id };
  let confirm = tokens.create_or_inert(&TokenPayload::Confirm(p.clone())).await;
  let decline = tokens.create_or_inert(&TokenPayload::Decline(p)).await;
  vec![vec![Button::new("Work done", &confirm), Button::new("Decline", &decline)]]
}

/// "Are you sure" pair: `yes` commits, back returns to [`choice`].
pub async fn reaffirm(tokens: &TokenService, yes: TokenPayload, yes_label: &str, order_id: OrderId, expert_id: i64) -> Keyboard {
  let yes = tokens.create_or_inert(&yes).await;
  let back = tokens
    .create_or_inert(&TokenPayload::ReaffirmBack(ExpertPayload { order_id, expert_id }))
    .await;
  vec![vec![Button::new(yes_label, &yes), Button::new("Back", &back)]]
}

pub async fn verify(tokens: &TokenService, order_id: OrderId, client_chat_id: i64) -> Keyboard {
  let data = tokens
    .create_or_inert(&TokenPayload::Verify(ClientPayload {
      order_id,
      client_chat_id,
    }))
    .await;
  vec![vec![Button::new("I received it, release payment", &data)]]
}

/// One row of five stars, one token per star.
pub async fn rating(tokens: &TokenService, order_id: OrderId) -> Keyboard {
  let mut row = Vec::with_capacity(5);
  for rate in 1..=5u8 {
    let data = tokens
      .create_or_inert(&TokenPayload::Rate(RatePayload { order_id, rate }))
      .await;
    row.push(Button::new(format!("{}★", rate), &data));
  }
  vec![row]
}
