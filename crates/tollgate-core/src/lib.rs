//! Tollgate Core Business Logic
//!
//! This crate provides the auth flow controller: registration, login,
//! refresh-token rotation and logout, coordinating the credential store,
//! the token manager and the session ledger.

pub mod config;
pub mod error;
pub mod service;
pub mod validation;

pub use config::AuthSettings;
pub use error::AuthError;
pub use service::{AccountView, AuthService, TokenPair};
pub use validation::{normalize_email, validate_password};
