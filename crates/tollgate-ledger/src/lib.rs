//! Tollgate Session Ledger
//!
//! This crate records which refresh token is currently honored for each
//! account, with automatic expiry. Backed by Redis in production and by an
//! in-process map for tests and single-node development.

pub mod backend;
pub mod error;
pub mod memory;
pub mod redis_store;

pub use backend::{SessionLedger, hash_token};
pub use error::LedgerError;
pub use memory::MemoryLedger;
pub use redis_store::RedisLedger;
