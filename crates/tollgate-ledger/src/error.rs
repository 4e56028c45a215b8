//! Ledger error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),
}
