//! Authentication error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Token signing and verification failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Failed to sign token: {0}")]
    Signing(String),

    #[error("Invalid token")]
    Invalid,

    #[error("Token expired")]
    Expired,

    #[error("Malformed token")]
    Malformed,

    #[error("Key error: {0}")]
    Key(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => TokenError::Malformed,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        }
    }
}

/// Password hashing failures
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Password hashing error: {0}")]
    Hash(String),

    #[error("Stored password hash is unreadable: {0}")]
    CorruptHash(String),
}

/// Request gate rejections
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Missing authorization header")]
    MissingAuthHeader,

    #[error("Invalid authorization header format")]
    InvalidAuthHeader,

    #[error("Token rejected: {0}")]
    Token(#[from] TokenError),
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        tracing::debug!("Request gate rejected request: {}", self);

        // Every cause looks the same to the client
        let body = axum::Json(json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": "Unauthorized"
            }
        }));

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}
