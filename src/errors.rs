use crate::{
    models::{address::UnsupportedAddressError, notification::DecodeError},
    services::transfer_service::TransferError,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use thiserror::Error;

/// Everything that can end a consumer run early.
///
/// None of these are retried; the current notification stays on the queue
/// unless the failure happened while deleting it.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    UnsupportedAddress(#[from] UnsupportedAddressError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("queue {op} failed: {message}")]
    Queue { op: &'static str, message: String },
}

impl RelayError {
    pub fn queue(op: &'static str, err: impl fmt::Display) -> Self {
        Self::Queue {
            op,
            message: err.to_string(),
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

/// Error surfaced to the trigger caller.
///
/// The caller only learns that the run failed; the cause is logged server side.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let reason = self.status.canonical_reason().unwrap_or("Error");
        (self.status, reason).into_response()
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        AppError::internal(err.to_string())
    }
}
