//! Tollgate Authentication Primitives
//!
//! This crate provides RS256 token signing and verification, Argon2
//! password hashing, and the request gate that protected services mount
//! in front of their routes. Services that only verify access tokens
//! need nothing but `TokenVerifier` and the public key.

pub mod error;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use error::{GateError, PasswordError, TokenError};
pub use jwt::{Claims, TokenManager, TokenType, TokenVerifier};
pub use middleware::{AuthSubject, require_access_token};
pub use password::{hash_password, verify_password};
