use axum::extract::FromRequest;

use crate::error::LedgerError;

/// JSON body whose parse failures answer as `VALIDATION_ERROR` instead of
/// axum's plain-text rejection.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(LedgerError))]
pub struct LedgerJson<T>(pub T);
