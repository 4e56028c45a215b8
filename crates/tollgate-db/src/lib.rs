//! Tollgate Credential Store
//!
//! This crate provides the durable account store for Tollgate,
//! using SQLite via sqlx for persistence.

pub mod error;
pub mod models;
pub mod repository;
pub mod store;
pub mod utils;

pub use error::DbError;
pub use models::*;
pub use repository::Database;
pub use store::CredentialStore;
