//! Tollgate REST API
//!
//! This crate provides the Axum-based HTTP API for Tollgate:
//! registration, login, token refresh and logout.

pub mod error;
pub mod routes;
pub mod state;
pub mod trace;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, CookieSettings, MetricsHandle};
pub use trace::with_request_tracing;
