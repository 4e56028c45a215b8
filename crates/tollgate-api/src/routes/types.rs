//! Request/Response DTOs for the auth API

use serde::{Deserialize, Serialize};
use tollgate_core::{AccountView, TokenPair};

/// Register request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Refresh or logout request body
#[derive(Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Account response (without password)
#[derive(Serialize)]
pub struct AccountResponse {
    pub id: i64,
    pub email: String,
}

impl From<AccountView> for AccountResponse {
    fn from(account: AccountView) -> Self {
        Self {
            id: account.id,
            email: account.email,
        }
    }
}

/// Issued token pair
#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub refresh_expires_in: u64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            expires_in: pair.access_expires_in.as_secs(),
            refresh_expires_in: pair.refresh_expires_in.as_secs(),
        }
    }
}

/// Authenticated caller
#[derive(Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub expires_at: i64,
}

/// Generic status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}
