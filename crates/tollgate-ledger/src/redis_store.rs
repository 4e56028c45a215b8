//! Redis-backed session ledger

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::{SessionLedger, ensure_ttl};
use crate::error::LedgerError;

const DEFAULT_KEY_PREFIX: &str = "tollgate:session";

/// Compare-and-set: write ARGV[2] with PX ARGV[3] only while KEYS[1] == ARGV[1]
const ROTATE_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
        return 1
    end
    return 0
"#;

/// Session ledger stored in Redis
///
/// Each account maps to a single string key written with `SET .. PX`, which
/// replaces value and expiry in one atomic command.
#[derive(Clone)]
pub struct RedisLedger {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisLedger {
    /// Connect to Redis and build a ledger using the default key prefix
    pub async fn connect(redis_url: &str) -> Result<Self, LedgerError> {
        Self::connect_with_prefix(redis_url, DEFAULT_KEY_PREFIX).await
    }

    /// Connect to Redis using a custom key prefix
    pub async fn connect_with_prefix(redis_url: &str, key_prefix: &str) -> Result<Self, LedgerError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        info!("Connected session ledger to Redis");

        Ok(Self {
            conn,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn key(&self, account_id: i64) -> String {
        session_key(&self.key_prefix, account_id)
    }
}

fn session_key(prefix: &str, account_id: i64) -> String {
    format!("{}:{}", prefix, account_id)
}

#[async_trait]
impl SessionLedger for RedisLedger {
    async fn put(
        &self,
        account_id: i64,
        token_ref: &str,
        ttl: Duration,
    ) -> Result<(), LedgerError> {
        ensure_ttl(ttl)?;
        let key = self.key(account_id);
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(&key)
            .arg(token_ref)
            .arg("PX")
            .arg(millis)
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!("Stored session for account {} (ttl {}ms)", account_id, millis);
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
        let key = self.key(account_id);
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let mut conn = self.conn.clone();
        let swapped = redis::Script::new(ROTATE_SCRIPT)
            .key(&key)
            .arg(expected)
            .arg(token_ref)
            .arg(millis)
            .invoke_async::<_, i64>(&mut conn)
            .await?;

        debug!("Rotate for account {} swapped={}", account_id, swapped == 1);
        Ok(swapped == 1)
    }

    async fn get(&self, account_id: i64) -> Result<Option<String>, LedgerError> {
        let key = self.key(account_id);
        let mut conn = self.conn.clone();
        let value = redis::cmd("GET")
            .arg(&key)
            .query_async::<_, Option<String>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn delete(&self, account_id: i64) -> Result<bool, LedgerError> {
        let key = self.key(account_id);
        let mut conn = self.conn.clone();
        let removed = redis::cmd("DEL")
            .arg(&key)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(removed > 0)
    }
}
