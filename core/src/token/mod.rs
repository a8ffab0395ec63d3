// escrow/src/token/mod.rs

//! Single-use callback tokens.
//!
//! A rendered button carries `"<action>:<token>"`. The token is the only binding
//! between a click and the operation it authorizes, the order it applies to, and
//! the one-time-use guarantee. Payloads are chosen by the server and live in the
//! token store, never in the button itself.

pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EscrowError, EscrowResult};
use crate::order::OrderId;

pub use service::TokenService;

/// Separator between the action name and the token in button callback data.
pub const CALLBACK_SEPARATOR: char = ':';

/// Namespace of a token: which transition family it authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
  Accept,
  Cancel,
  Confirm,
  Decline,
  ConfirmedReaffirm,
  DeclinedReaffirm,
  ReaffirmBack,
  Verify,
  Rate,
}

impl Action {
  pub const ALL: [Action; 9] = [
    Action::Accept,
    Action::Cancel,
    Action::Confirm,
    Action::Decline,
    Action::ConfirmedReaffirm,
    Action::DeclinedReaffirm,
    Action::ReaffirmBack,
    Action::Verify,
    Action::Rate,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Action::Accept => "accept",
      Action::Cancel => "cancel",
      Action::Confirm => "confirm",
      Action::Decline => "decline",
      Action::ConfirmedReaffirm => "confirmed_reaffirm",
      Action::DeclinedReaffirm => "declined_reaffirm",
      Action::ReaffirmBack => "reaffirm_back",
      Action::Verify => "verify",
      Action::Rate => "rate",
    }
  }

  /// Mutually exclusive branches (the action itself included) whose outstanding
  /// tokens for the same order die once this action is taken.
  pub fn siblings(&self) -> &'static [Action] {
    match self {
      Action::Accept | Action::Cancel => &[Action::Accept, Action::Cancel],
      Action::Confirm | Action::Decline => &[Action::Confirm, Action::Decline],
      Action::ConfirmedReaffirm | Action::DeclinedReaffirm | Action::ReaffirmBack => {
        &[Action::ConfirmedReaffirm, Action::DeclinedReaffirm, Action::ReaffirmBack]
      }
      Action::Verify => &[Action::Verify],
      Action::Rate => &[Action::Rate],
    }
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Action {
  type Err = EscrowError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Action::ALL
      .iter()
      .copied()
      .find(|a| a.as_str() == s)
      .ok_or_else(|| EscrowError::invalid(format!("unknown action '{}'", s)))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptPayload {
  pub order_id: OrderId,
  pub expert_id: i64,
  pub expert_chat_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPayload {
  pub order_id: OrderId,
  pub client_chat_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertPayload {
  pub order_id: OrderId,
  pub expert_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePayload {
  pub order_id: OrderId,
  pub rate: u8,
}

/// Strongly typed payload per action. The variant *is* the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPayload {
  Accept(AcceptPayload),
  Cancel(ClientPayload),
  Confirm(ExpertPayload),
  Decline(ExpertPayload),
  ConfirmedReaffirm(ExpertPayload),
  DeclinedReaffirm(ExpertPayload),
  ReaffirmBack(ExpertPayload),
  Verify(ClientPayload),
  Rate(RatePayload),
}

impl TokenPayload {
  pub fn action(&self) -> Action {
    match self {
      TokenPayload::Accept(_) => Action::Accept,
      TokenPayload::Cancel(_) => Action::Cancel,
      TokenPayload::Confirm(_) => Action::Confirm,
      TokenPayload::Decline(_) => Action::Decline,
      TokenPayload::ConfirmedReaffirm(_) => Action::ConfirmedReaffirm,
      TokenPayload::DeclinedReaffirm(_) => Action::DeclinedReaffirm,
      TokenPayload::ReaffirmBack(_) => Action::ReaffirmBack,
      TokenPayload::Verify(_) => Action::Verify,
      TokenPayload::Rate(_) => Action::Rate,
    }
  }

  pub fn order_id(&self) -> OrderId {
    match self {
      TokenPayload::Accept(p) => p.order_id,
      TokenPayload::Cancel(p) | TokenPayload::Verify(p) => p.order_id,
      TokenPayload::Confirm(p)
      | TokenPayload::Decline(p)
      | TokenPayload::ConfirmedReaffirm(p)
      | TokenPayload::DeclinedReaffirm(p)
      | TokenPayload::ReaffirmBack(p) => p.order_id,
      TokenPayload::Rate(p) => p.order_id,
    }
  }

  /// Serializes only the inner record; the action is stored in its own column.
  pub fn encode(&self) -> EscrowResult<String> {
    let encoded = match self {
      TokenPayload::Accept(p) => serde_json::to_string(p),
      TokenPayload::Cancel(p) | TokenPayload::Verify(p) => serde_json::to_string(p),
      TokenPayload::Confirm(p)
      | TokenPayload::Decline(p)
      | TokenPayload::ConfirmedReaffirm(p)
      | TokenPayload::DeclinedReaffirm(p)
      | TokenPayload::ReaffirmBack(p) => serde_json::to_string(p),
      TokenPayload::Rate(p) => serde_json::to_string(p),
    };
    encoded.map_err(|e| EscrowError::Internal(format!("payload encode failed: {}", e)))
  }

  pub fn decode(action: Action, raw: &str) -> EscrowResult<Self> {
    let payload = match action {
      Action::Accept => TokenPayload::Accept(serde_json::from_str(raw)?),
      Action::Cancel => TokenPayload::Cancel(serde_json::from_str(raw)?),
      Action::Confirm => TokenPayload::Confirm(serde_json::from_str(raw)?),
      Action::Decline => TokenPayload::Decline(serde_json::from_str(raw)?),
      Action::ConfirmedReaffirm => TokenPayload::ConfirmedReaffirm(serde_json::from_str(raw)?),
      Action::DeclinedReaffirm => TokenPayload::DeclinedReaffirm(serde_json::from_str(raw)?),
      Action::ReaffirmBack => TokenPayload::ReaffirmBack(serde_json::from_str(raw)?),
      Action::Verify => TokenPayload::Verify(serde_json::from_str(raw)?),
      Action::Rate => TokenPayload::Rate(serde_json::from_str(raw)?),
    };
    Ok(payload)
  }
}

/// Persisted form of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackToken {
  pub token: String,
  pub action: Action,
  pub order_id: OrderId,
  pub payload: String,
  pub created_at: DateTime<Utc>,
}

/// Parsed button callback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackData {
  pub action: Action,
  pub token: String,
}

impl CallbackData {
  pub fn new(action: Action, token: impl Into<String>) -> Self {
    Self {
      action,
      token: token.into(),
    }
  }

  pub fn parse(raw: &str) -> EscrowResult<Self> {
    let (action, token) = raw
      .split_once(CALLBACK_SEPARATOR)
      .ok_or_else(|| EscrowError::invalid(format!("callback data '{}' has no action prefix", raw)))?;
    if token.is_empty() {
      return Err(EscrowError::invalid("callback data carries an empty token"));
    }
    Ok(Self {
      action: action.parse()?,
      token: token.to_string(),
    })
  }

  pub fn render(&self) -> String {
    format!("{}{}{}", self.action.as_str(), CALLBACK_SEPARATOR, self.token)
  }
}
