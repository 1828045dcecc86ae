use crate::handlers::response::write_error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

/// A lightweight wrapper for handler errors that keeps the message local.
///
/// Every failure the API reports, whatever its cause, is rendered as
/// `{"error": "<message>"}` with the wrapped status.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }

    /// Prefix an underlying error with what was being attempted.
    pub fn context<E: fmt::Display>(what: &str) -> impl FnOnce(E) -> Self + '_ {
        move |err| Self::internal(format!("{}: {}", what, err))
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
        write_error(self.status, &self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_message() {
        let err = AppError::context("failed to list files")("connection reset");
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "failed to list files: connection reset");
    }
}
