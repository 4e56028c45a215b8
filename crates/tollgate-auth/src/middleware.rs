//! Request gate for protected routes

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::GateError;
use crate::jwt::{Claims, TokenType, TokenVerifier};

/// Verified caller identity attached to the request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSubject {
    pub account_id: i64,
    /// Expiry of the access token that authenticated the request
    pub expires_at: i64,
}

impl AuthSubject {
    /// Create from verified access-token claims
    pub fn from_claims(claims: &Claims) -> Result<Self, GateError> {
        Ok(Self {
            account_id: claims.account_id()?,
            expires_at: claims.exp,
        })
    }
}

/// Extract bearer token from authorization header
pub fn extract_bearer_token(header: &str) -> Result<&str, GateError> {
    match header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(GateError::InvalidAuthHeader),
    }
}

/// Request gate middleware
///
/// Requires a valid access token in the Authorization header. Only the
/// public key is consulted; revoked sessions stay usable until their access
/// token expires.
pub async fn require_access_token(
    State(verifier): State<Arc<TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, GateError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(GateError::MissingAuthHeader)?;

    let token = extract_bearer_token(header)?;
    let claims = verifier.verify_as(token, TokenType::Access)?;
    let subject = AuthSubject::from_claims(&claims)?;

    debug!("Authenticated account {}", subject.account_id);

    request.extensions_mut().insert(subject);
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthSubject
where
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthSubject>()
            .cloned()
            .ok_or(GateError::MissingAuthHeader)
    }
}
