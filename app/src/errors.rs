// escrow_app/src/errors.rs

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use escrow::EscrowError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  /// Intake is closed or a dependency is temporarily out of reach.
  #[error("Service Unavailable: {0}")]
  Unavailable(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Escrow Workflow Error: {source}")]
  Workflow { source: EscrowError },
}

/// Client-caused escrow errors keep their meaning over HTTP; everything else is a workflow failure.
impl From<EscrowError> for AppError {
  fn from(err: EscrowError) -> Self {
    match err {
      EscrowError::NotFound(m) => AppError::NotFound(m),
      EscrowError::Invalid(m) => AppError::Validation(m),
      EscrowError::Conflict(m) => AppError::Conflict(m),
      EscrowError::Unavailable(m) => AppError::Unavailable(m),
      other => AppError::Workflow { source: other },
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Conflict(_) => StatusCode::CONFLICT,
      AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Workflow { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    // Log the full error when it's turned into a response
    tracing::error!(application_error = %self, "Responding with error");
    let body = match self {
      AppError::Validation(m) | AppError::NotFound(m) | AppError::Conflict(m) | AppError::Unavailable(m) => {
        json!({ "error": m })
      }
      AppError::Config(m) => json!({"error": "Configuration issue", "detail": m}),
      AppError::Sqlx(_) => json!({"error": "Database operation failed"}),
      AppError::Workflow { source } => {
        json!({"error": "Workflow processing error", "detail": source.to_string()})
      }
    };
    HttpResponse::build(self.status_code()).json(body)
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn escrow_errors_map_to_http_statuses() {
    let cases = [
      (EscrowError::not_found("order 9"), StatusCode::NOT_FOUND),
      (EscrowError::invalid("category"), StatusCode::BAD_REQUEST),
      (EscrowError::Conflict("lookup".into()), StatusCode::CONFLICT),
      (EscrowError::Unavailable("db".into()), StatusCode::SERVICE_UNAVAILABLE),
      (EscrowError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, status) in cases {
      assert_eq!(AppError::from(err).status_code(), status);
    }
  }
}
