//! In-process session ledger

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::backend::{SessionLedger, ensure_ttl};
use crate::error::LedgerError;

struct Entry {
    token_ref: String,
    expires_at: Instant,
}

/// Session ledger kept in a mutex-guarded map
///
/// Expired entries are dropped lazily on read and by `purge_expired`.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<i64, Entry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired record, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl SessionLedger for MemoryLedger {
    async fn put(
        &self,
        account_id: i64,
        token_ref: &str,
        ttl: Duration,
    ) -> Result<(), LedgerError> {
        ensure_ttl(ttl)?;
        let entry = Entry {
            token_ref: token_ref.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().insert(account_id, entry);
        debug!("Stored session for account {} (ttl {:?})", account_id, ttl);
        Ok(())
    }

    async fn rotate(
        &self,
        account_id: i64,
        expected: &str,
        token_ref: &str,
        ttl: Duration,
    ) -> Result<bool, LedgerError> {
        ensure_ttl(ttl)?;
        let mut entries = self.entries.lock();
        let now = Instant::now();

        match entries.get_mut(&account_id) {
            Some(entry) if entry.expires_at > now && entry.token_ref == expected => {
                entry.token_ref = token_ref.to_string();
                entry.expires_at = now + ttl;
                debug!("Rotated session for account {}", account_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, account_id: i64) -> Result<Option<String>, LedgerError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let found = entries
            .get(&account_id)
            .map(|e| (e.expires_at > now, e.token_ref.clone()));

        match found {
            Some((true, token_ref)) => Ok(Some(token_ref)),
            Some((false, _)) => {
                entries.remove(&account_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, account_id: i64) -> Result<bool, LedgerError> {
        Ok(self.entries.lock().remove(&account_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_put_overwrites_previous_record() {
        let ledger = MemoryLedger::new();

        ledger.put(1, "first", HOUR).await.unwrap();
        ledger.put(1, "second", HOUR).await.unwrap();

        assert_eq!(ledger.get(1).await.unwrap().as_deref(), Some("second"));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_accounts_are_independent() {
        let ledger = MemoryLedger::new();

        ledger.put(1, "one", HOUR).await.unwrap();
        ledger.put(2, "two", HOUR).await.unwrap();
        ledger.delete(1).await.unwrap();

        assert!(ledger.get(1).await.unwrap().is_none());
        assert_eq!(ledger.get(2).await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_records_expire() {
        let ledger = MemoryLedger::new();

        ledger.put(1, "short", Duration::from_millis(30)).await.unwrap();
        ledger.put(2, "long", HOUR).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(ledger.get(1).await.unwrap().is_none());
        assert_eq!(ledger.purge_expired(), 0);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let ledger = MemoryLedger::new();

        ledger.put(1, "a", Duration::from_millis(10)).await.unwrap();
        ledger.put(2, "b", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(ledger.purge_expired(), 2);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let ledger = MemoryLedger::new();

        ledger.put(1, "token", HOUR).await.unwrap();
        assert!(ledger.delete(1).await.unwrap());
        assert!(!ledger.delete(1).await.unwrap());
        assert!(ledger.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rotate_requires_current_marker() {
        let ledger = MemoryLedger::new();
        ledger.put(1, "first", HOUR).await.unwrap();

        assert!(!ledger.rotate(1, "stale", "second", HOUR).await.unwrap());
        assert_eq!(ledger.get(1).await.unwrap().as_deref(), Some("first"));

        assert!(ledger.rotate(1, "first", "second", HOUR).await.unwrap());
        assert_eq!(ledger.get(1).await.unwrap().as_deref(), Some("second"));

        // The marker it replaced cannot be rotated a second time
        assert!(!ledger.rotate(1, "first", "third", HOUR).await.unwrap());
    }

    #[tokio::test]
    async fn test_rotate_does_not_recreate_deleted_record() {
        let ledger = MemoryLedger::new();
        ledger.put(1, "first", HOUR).await.unwrap();
        ledger.delete(1).await.unwrap();

        assert!(!ledger.rotate(1, "first", "second", HOUR).await.unwrap());
        assert!(ledger.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rotate_skips_expired_record() {
        let ledger = MemoryLedger::new();
        ledger.put(1, "first", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(!ledger.rotate(1, "first", "second", HOUR).await.unwrap());
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_an_error() {
        let ledger = MemoryLedger::new();
        let err = ledger.put(1, "token", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTtl(_)));
    }
}
