// escrow/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Error taxonomy shared by the order state machine, the token service and the flows.
///
/// `Invalid` and `AlreadyProcessed` are the steady-state outcome of a replay-prone
/// channel: a second click on an inert button, or the loser of a transition race.
/// Flows resolve them locally (see [`EscrowError::is_benign`]).
#[derive(Debug, Error)]
pub enum EscrowError {
  #[error("Not found: {0}")]
  NotFound(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Invalid: {0}")]
  Invalid(String),

  /// The guarded write matched zero rows: a concurrent or duplicate event already moved the order.
  #[error("Order {order_id} already processed (transition '{transition}' lost the race)")]
  AlreadyProcessed { order_id: i64, transition: &'static str },

  #[error("Unavailable: {0}")]
  Unavailable(String),

  #[error("External service error: {0}")]
  External(String),

  #[error("Flow configuration error for '{flow}': {message}")]
  Configuration { flow: String, message: String },

  #[error("Internal error: {0}")]
  Internal(String),
}

impl EscrowError {
  /// True for outcomes that are expected under at-most-once delivery and must not surface to users.
  pub fn is_benign(&self) -> bool {
    matches!(self, EscrowError::Invalid(_) | EscrowError::AlreadyProcessed { .. })
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, EscrowError::NotFound(_))
  }

  pub fn not_found(what: impl Into<String>) -> Self {
    EscrowError::NotFound(what.into())
  }

  pub fn invalid(what: impl Into<String>) -> Self {
    EscrowError::Invalid(what.into())
  }
}

impl From<AnyhowError> for EscrowError {
  fn from(err: AnyhowError) -> Self {
    // Unwrap an EscrowError that was carried through anyhow rather than flattening it.
    match err.downcast::<EscrowError>() {
      Ok(inner) => inner,
      Err(other) => EscrowError::Internal(format!("{:#}", other)),
    }
  }
}

impl From<serde_json::Error> for EscrowError {
  fn from(err: serde_json::Error) -> Self {
    if err.is_data() || err.is_syntax() || err.is_eof() {
      EscrowError::Invalid(format!("payload decode failed: {}", err))
    } else {
      EscrowError::Internal(format!("payload encode failed: {}", err))
    }
  }
}

pub type EscrowResult<T, E = EscrowError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn benign_outcomes_are_invalid_and_lost_races() {
    assert!(EscrowError::invalid("consumed").is_benign());
    assert!(EscrowError::AlreadyProcessed {
      order_id: 7,
      transition: "accept"
    }
    .is_benign());
    assert!(!EscrowError::not_found("order 7").is_benign());
    assert!(!EscrowError::Unavailable("pool timed out".into()).is_benign());
  }

  #[test]
  fn anyhow_round_trip_keeps_variant() {
    let wrapped = AnyhowError::new(EscrowError::not_found("order 3"));
    match EscrowError::from(wrapped) {
      EscrowError::NotFound(msg) => assert_eq!(msg, "order 3"),
      other => panic!("expected NotFound, got {:?}", other),
    }

    let plain = anyhow::anyhow!("socket closed");
    assert!(matches!(EscrowError::from(plain), EscrowError::Internal(_)));
  }

  #[test]
  fn json_syntax_errors_are_invalid() {
    let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    assert!(matches!(EscrowError::from(err), EscrowError::Invalid(_)));
  }
}
