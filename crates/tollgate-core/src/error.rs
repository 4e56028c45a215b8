//! Core error types

use std::fmt::Display;
use thiserror::Error;
use tracing::error;

/// Closed set of outcomes the auth flow can fail with
///
/// Store and signing faults are folded into `Internal` before they leave
/// this crate; callers never see a raw `DbError` or `LedgerError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad credentials or an invalid, expired or revoked token.
    /// Deliberately carries no cause.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Log a store or signing fault with context and fold it into `Internal`
    pub fn internal(operation: &str, err: impl Display) -> Self {
        error!("{} failed: {}", operation, err);
        AuthError::Internal(format!("{} failed", operation))
    }
}
