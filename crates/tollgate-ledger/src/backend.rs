//! Session ledger trait

use async_trait::async_trait;
use std::time::Duration;

use crate::error::LedgerError;

/// Session ledger trait
///
/// Holds at most one record per account. Writes are atomic per key, so when
/// two writers race for the same account the last one wins and the other
/// record is gone.
#[async_trait]
pub trait SessionLedger: Send + Sync {
    /// Store the active session marker for an account, replacing any previous one
    async fn put(&self, account_id: i64, token_ref: &str, ttl: Duration)
    -> Result<(), LedgerError>;

    /// Replace the marker only if it still equals `expected`
    ///
    /// Check and write happen as one step. Returns `false` when the record is
    /// missing, expired, or holds a different marker; nothing is written then.
    async fn rotate(
        &self,
        account_id: i64,
        expected: &str,
        token_ref: &str,
        ttl: Duration,
    ) -> Result<bool, LedgerError>;

    /// Fetch the active session marker, `None` if absent or expired
    async fn get(&self, account_id: i64) -> Result<Option<String>, LedgerError>;

    /// Remove the session marker. Returns whether a record existed.
    async fn delete(&self, account_id: i64) -> Result<bool, LedgerError>;
}

/// Digest a token for storage so the ledger never holds a usable credential
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub(crate) fn ensure_ttl(ttl: Duration) -> Result<(), LedgerError> {
    if ttl.is_zero() {
        return Err(LedgerError::InvalidTtl("TTL must be positive".to_string()));
    }
    Ok(())
}
