use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use inzozi_db::StoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    /// Loan approval stored the decision but not a complete schedule.
    #[error("loan {loan_id} needs manual reconciliation: {detail}")]
    PartialWrite { loan_id: Uuid, detail: String },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("storage failure: {0:#}")]
    Persistence(anyhow::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        LedgerError::InvalidState(message.into())
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            LedgerError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            LedgerError::InvalidState(_) => (StatusCode::CONFLICT, "INVALID_STATE"),
            LedgerError::PartialWrite { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PARTIAL_WRITE")
            }
            LedgerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            LedgerError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            LedgerError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR"),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => LedgerError::NotFound(err.to_string()),
            StoreError::Conflict { .. } => LedgerError::InvalidState(err.to_string()),
            StoreError::Backend(e) => LedgerError::Persistence(e),
        }
    }
}

impl From<JsonRejection> for LedgerError {
    fn from(rejection: JsonRejection) -> Self {
        LedgerError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            LedgerError::Persistence(e) => {
                error!("Storage failure: {:#}", e);
                "The ledger could not be updated, please try again".to_string()
            }
            LedgerError::PartialWrite { loan_id, detail } => {
                error!("Loan {} flagged for reconciliation: {}", loan_id, detail);
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
