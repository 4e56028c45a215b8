//! Auth flow controller
//!
//! Session lifecycle per account:
//!
//! ```text
//! Anonymous --login--> Authenticated(access, refresh)
//! Authenticated --refresh--> Authenticated(access', refresh')
//! Authenticated --logout / rejected refresh--> Anonymous
//! ```
//!
//! Exactly one refresh token is honored per account at a time. Login
//! overwrites the ledger record, retiring whatever token was there even if it
//! has not expired. Refresh replaces the record only while it still holds the
//! presented token, so of two racing refreshes one fails, and a logout that
//! lands mid-refresh stays in effect.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tollgate_auth::{Claims, TokenManager, TokenType, TokenVerifier, hash_password, verify_password};
use tollgate_db::{CredentialStore, DbError, NewAccount};
use tollgate_ledger::{SessionLedger, hash_token};
use tracing::{debug, info, warn};

use crate::config::AuthSettings;
use crate::error::AuthError;
use crate::validation::{normalize_email, validate_password};

/// Public view of an account (never includes the hash)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountView {
    pub id: i64,
    pub email: String,
}

/// Freshly issued access and refresh tokens
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_in: Duration,
    pub refresh_expires_in: Duration,
}

/// Orchestrates register, login, refresh and logout
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    ledger: Arc<dyn SessionLedger>,
    tokens: Arc<TokenManager>,
    settings: AuthSettings,
    /// Verified against when the account does not exist, so a miss costs
    /// the same as a wrong password
    dummy_hash: String,
}

impl AuthService {
    /// Create a new auth service
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        ledger: Arc<dyn SessionLedger>,
        tokens: Arc<TokenManager>,
        settings: AuthSettings,
    ) -> Result<Self, AuthError> {
        settings.validate()?;

        let dummy_hash = hash_password(&uuid::Uuid::new_v4().to_string())
            .map_err(|e| AuthError::internal("dummy hash generation", e))?;

        Ok(Self {
            credentials,
            ledger,
            tokens,
            settings,
            dummy_hash,
        })
    }

    /// Verify-only handle for request gates
    pub fn verifier(&self) -> &TokenVerifier {
        self.tokens.verifier()
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, email: &str, password: &str) -> Result<AccountView, AuthError> {
        let email = normalize_email(email)?;
        validate_password(password)?;

        // Checked up front so duplicates skip the expensive hash
        match self
            .bounded("credential lookup", self.credentials.find_by_identity(&email))
            .await?
        {
            Ok(_) => {
                warn!("Registration rejected, account exists: {}", email);
                return Err(AuthError::Conflict("account already exists".to_string()));
            }
            Err(DbError::NotFound(_)) => {}
            Err(e) => return Err(AuthError::internal("credential lookup", e)),
        }

        let password_hash = hash_blocking(password.to_string()).await?;

        let account = match self
            .bounded(
                "credential insert",
                self.credentials.create(NewAccount {
                    email: email.clone(),
                    password_hash,
                }),
            )
            .await?
        {
            Ok(account) => account,
            Err(DbError::Duplicate(_)) => {
                warn!("Registration lost race for existing account: {}", email);
                return Err(AuthError::Conflict("account already exists".to_string()));
            }
            Err(e) => return Err(AuthError::internal("credential insert", e)),
        };

        info!("Registered account {} ({})", account.id, account.email);

        Ok(AccountView {
            id: account.id,
            email: account.email,
        })
    }

    /// Check credentials and start a new session
    ///
    /// An unknown email and a wrong password produce the same error.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email)?;
        validate_password(password)?;

        debug!("Login attempt for: {}", email);

        let account = match self
            .bounded("credential lookup", self.credentials.find_by_identity(&email))
            .await?
        {
            Ok(account) => Some(account),
            Err(DbError::NotFound(_)) => None,
            Err(e) => return Err(AuthError::internal("credential lookup", e)),
        };

        let hash_to_verify = account
            .as_ref()
            .map(|a| a.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());
        let password_valid = verify_blocking(password.to_string(), hash_to_verify).await?;

        let account = match (account, password_valid) {
            (Some(account), true) => account,
            _ => {
                warn!("Login rejected for: {}", email);
                return Err(AuthError::Unauthorized);
            }
        };

        let pair = self.start_session(account.id).await?;
        info!("Account {} logged in", account.id);
        Ok(pair)
    }

    /// Exchange the current refresh token for a new pair, retiring the old one
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .tokens
            .verify_as(refresh_token, TokenType::Refresh)
            .map_err(|e| {
                warn!("Refresh rejected: {}", e);
                AuthError::Unauthorized
            })?;
        let account_id = claims.account_id().map_err(|_| AuthError::Unauthorized)?;

        // Swap only if the presented token is still the recorded one, so a
        // concurrent logout or refresh cannot be overwritten
        let pair = self.issue_pair(account_id)?;
        let rotated = self
            .bounded(
                "session rotate",
                self.ledger.rotate(
                    account_id,
                    &hash_token(refresh_token),
                    &hash_token(&pair.refresh_token),
                    self.settings.refresh_ttl,
                ),
            )
            .await?
            .map_err(|e| AuthError::internal("session rotate", e))?;

        if !rotated {
            warn!(
                "Refresh rejected for account {}: token superseded or session ended",
                account_id
            );
            return Err(AuthError::Unauthorized);
        }

        info!("Rotated refresh token for account {}", account_id);
        Ok(pair)
    }

    /// End the session of whoever owns the presented token
    ///
    /// Accepts either token class as long as it verifies. Logging out twice
    /// is not an error.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.tokens.verify(token).map_err(|e| {
            warn!("Logout rejected: {}", e);
            AuthError::Unauthorized
        })?;
        let account_id = claims.account_id().map_err(|_| AuthError::Unauthorized)?;

        let removed = self
            .bounded("session delete", self.ledger.delete(account_id))
            .await?
            .map_err(|e| AuthError::internal("session delete", e))?;

        if removed {
            info!("Account {} logged out", account_id);
        } else {
            debug!("Logout for account {} found no active session", account_id);
        }
        Ok(())
    }

    /// Verify an access token
    pub fn authenticate(&self, access_token: &str) -> Result<Claims, AuthError> {
        self.tokens
            .verify_as(access_token, TokenType::Access)
            .map_err(|_| AuthError::Unauthorized)
    }

    /// Issue a new pair and make its refresh token the only live one
    async fn start_session(&self, account_id: i64) -> Result<TokenPair, AuthError> {
        let pair = self.issue_pair(account_id)?;

        self.bounded(
            "session store",
            self.ledger.put(
                account_id,
                &hash_token(&pair.refresh_token),
                self.settings.refresh_ttl,
            ),
        )
        .await?
        .map_err(|e| AuthError::internal("session store", e))?;

        Ok(pair)
    }

    fn issue_pair(&self, account_id: i64) -> Result<TokenPair, AuthError> {
        let access_token = self
            .tokens
            .issue(account_id, self.settings.access_ttl, TokenType::Access)
            .map_err(|e| AuthError::internal("access token signing", e))?;
        let refresh_token = self
            .tokens
            .issue(account_id, self.settings.refresh_ttl, TokenType::Refresh)
            .map_err(|e| AuthError::internal("refresh token signing", e))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_in: self.settings.access_ttl,
            refresh_expires_in: self.settings.refresh_ttl,
        })
    }

    /// Run a store call under the configured deadline
    async fn bounded<F: Future>(&self, operation: &str, fut: F) -> Result<F::Output, AuthError> {
        tokio::time::timeout(self.settings.store_timeout, fut)
            .await
            .map_err(|_| {
                AuthError::internal(
                    operation,
                    format!("timed out after {:?}", self.settings.store_timeout),
                )
            })
    }
}

async fn hash_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::internal("password hashing task", e))?
        .map_err(|e| AuthError::internal("password hashing", e))
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::internal("password verification task", e))?
        .map_err(|e| AuthError::internal("password verification", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tollgate_db::Database;
    use tokio::sync::Notify;
    use tollgate_ledger::{LedgerError, MemoryLedger};

    const PRIVATE_PEM: &str = include_str!("../../../testdata/jwt_private.pem");
    const PUBLIC_PEM: &str = include_str!("../../../testdata/jwt_public.pem");

    struct Harness {
        service: Arc<AuthService>,
        tokens: Arc<TokenManager>,
        ledger: Arc<MemoryLedger>,
    }

    fn token_manager() -> Arc<TokenManager> {
        Arc::new(TokenManager::from_pem(PRIVATE_PEM.as_bytes(), PUBLIC_PEM.as_bytes()).unwrap())
    }

    async fn harness() -> Harness {
        let db = Database::in_memory().await.unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let tokens = token_manager();
        let service = AuthService::new(
            Arc::new(db),
            ledger.clone(),
            tokens.clone(),
            AuthSettings::default(),
        )
        .unwrap();

        Harness {
            service: Arc::new(service),
            tokens,
            ledger,
        }
    }

    async fn service_with_ledger(ledger: Arc<dyn SessionLedger>) -> AuthService {
        let db = Database::in_memory().await.unwrap();
        let settings = AuthSettings {
            store_timeout: Duration::from_millis(250),
            ..Default::default()
        };
        AuthService::new(Arc::new(db), ledger, token_manager(), settings).unwrap()
    }

    /// Ledger whose backing store is down
    struct UnreachableLedger;

    #[async_trait]
    impl SessionLedger for UnreachableLedger {
        async fn put(&self, _: i64, _: &str, _: Duration) -> Result<(), LedgerError> {
            Err(LedgerError::Unavailable("connection refused".to_string()))
        }

        async fn rotate(&self, _: i64, _: &str, _: &str, _: Duration) -> Result<bool, LedgerError> {
            Err(LedgerError::Unavailable("connection refused".to_string()))
        }

        async fn get(&self, _: i64) -> Result<Option<String>, LedgerError> {
            Err(LedgerError::Unavailable("connection refused".to_string()))
        }

        async fn delete(&self, _: i64) -> Result<bool, LedgerError> {
            Err(LedgerError::Unavailable("connection refused".to_string()))
        }
    }

    /// Ledger that accepts plain writes but hangs on reads and swaps
    #[derive(Default)]
    struct StallingLedger {
        inner: MemoryLedger,
    }

    #[async_trait]
    impl SessionLedger for StallingLedger {
        async fn put(&self, id: i64, token_ref: &str, ttl: Duration) -> Result<(), LedgerError> {
            self.inner.put(id, token_ref, ttl).await
        }

        async fn rotate(
            &self,
            id: i64,
            expected: &str,
            token_ref: &str,
            ttl: Duration,
        ) -> Result<bool, LedgerError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.inner.rotate(id, expected, token_ref, ttl).await
        }

        async fn get(&self, id: i64) -> Result<Option<String>, LedgerError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.inner.get(id).await
        }

        async fn delete(&self, id: i64) -> Result<bool, LedgerError> {
            self.inner.delete(id).await
        }
    }

    /// Ledger that parks every swap until the test lets it through
    #[derive(Default)]
    struct GatedLedger {
        inner: MemoryLedger,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SessionLedger for GatedLedger {
        async fn put(&self, id: i64, token_ref: &str, ttl: Duration) -> Result<(), LedgerError> {
            self.inner.put(id, token_ref, ttl).await
        }

        async fn rotate(
            &self,
            id: i64,
            expected: &str,
            token_ref: &str,
            ttl: Duration,
        ) -> Result<bool, LedgerError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.rotate(id, expected, token_ref, ttl).await
        }

        async fn get(&self, id: i64) -> Result<Option<String>, LedgerError> {
            self.inner.get(id).await
        }

        async fn delete(&self, id: i64) -> Result<bool, LedgerError> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_register_then_login_yields_subject() {
        let h = harness().await;

        let account = h.service.register("a@x.com", "p1").await.unwrap();
        assert_eq!(account.email, "a@x.com");

        let pair = h.service.login("a@x.com", "p1").await.unwrap();
        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());

        let claims = h.tokens.verify(&pair.access_token).unwrap();
        assert_eq!(claims.account_id().unwrap(), account.id);
        assert_eq!(claims.typ, TokenType::Access);

        let claims = h.service.authenticate(&pair.access_token).unwrap();
        assert_eq!(claims.account_id().unwrap(), account.id);
    }

    #[tokio::test]
    async fn test_register_normalizes_and_rejects_duplicates() {
        let h = harness().await;

        let account = h.service.register("  Bob@X.com", "secret").await.unwrap();
        assert_eq!(account.email, "bob@x.com");

        let err = h.service.register("bob@x.com", "other").await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));

        // Login works with any casing of the same identity
        assert!(h.service.login("BOB@x.COM", "secret").await.is_ok());
    }

    #[tokio::test]
    async fn test_register_validation() {
        let h = harness().await;

        assert!(matches!(
            h.service.register("not-an-email", "p1").await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            h.service.register("a@x.com", "").await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = harness().await;
        h.service.register("a@x.com", "p1").await.unwrap();

        let wrong_password = h.service.login("a@x.com", "nope").await.unwrap_err();
        let unknown_account = h.service.login("ghost@x.com", "p1").await.unwrap_err();

        assert_eq!(wrong_password, AuthError::Unauthorized);
        assert_eq!(wrong_password, unknown_account);
        assert_eq!(wrong_password.to_string(), unknown_account.to_string());
        assert!(h.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let h = harness().await;
        h.service.register("a@x.com", "p1").await.unwrap();
        let first = h.service.login("a@x.com", "p1").await.unwrap();

        let second = h.service.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        // The old token is retired immediately
        assert_eq!(
            h.service.refresh(&first.refresh_token).await.unwrap_err(),
            AuthError::Unauthorized
        );

        // The new one is live
        let third = h.service.refresh(&second.refresh_token).await.unwrap();
        assert_ne!(third.refresh_token, second.refresh_token);
    }

    #[tokio::test]
    async fn test_new_login_supersedes_previous_session() {
        let h = harness().await;
        h.service.register("a@x.com", "p1").await.unwrap();

        let laptop = h.service.login("a@x.com", "p1").await.unwrap();
        let phone = h.service.login("a@x.com", "p1").await.unwrap();

        assert_eq!(
            h.service.refresh(&laptop.refresh_token).await.unwrap_err(),
            AuthError::Unauthorized
        );
        assert!(h.service.refresh(&phone.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent_and_revokes() {
        let h = harness().await;
        h.service.register("a@x.com", "p1").await.unwrap();
        let pair = h.service.login("a@x.com", "p1").await.unwrap();

        h.service.logout(&pair.refresh_token).await.unwrap();
        h.service.logout(&pair.refresh_token).await.unwrap();

        assert_eq!(
            h.service.refresh(&pair.refresh_token).await.unwrap_err(),
            AuthError::Unauthorized
        );
    }

    #[tokio::test]
    async fn test_logout_with_access_token() {
        let h = harness().await;
        h.service.register("a@x.com", "p1").await.unwrap();
        let pair = h.service.login("a@x.com", "p1").await.unwrap();

        h.service.logout(&pair.access_token).await.unwrap();
        assert!(h.service.refresh(&pair.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_logout_requires_verifiable_token() {
        let h = harness().await;
        assert_eq!(
            h.service.logout("garbage").await.unwrap_err(),
            AuthError::Unauthorized
        );
    }

    #[tokio::test]
    async fn test_refresh_rejects_wrong_type_and_expired_tokens() {
        let h = harness().await;
        let account = h.service.register("a@x.com", "p1").await.unwrap();
        let pair = h.service.login("a@x.com", "p1").await.unwrap();

        assert_eq!(
            h.service.refresh(&pair.access_token).await.unwrap_err(),
            AuthError::Unauthorized
        );

        let stale = h
            .tokens
            .issue_at(
                account.id,
                Duration::from_secs(60),
                TokenType::Refresh,
                chrono::Utc::now() - chrono::Duration::hours(1),
            )
            .unwrap();
        assert_eq!(
            h.service.refresh(&stale).await.unwrap_err(),
            AuthError::Unauthorized
        );

        // A signed refresh token that was never recorded is not honored either
        let unrecorded = h
            .tokens
            .issue(account.id, Duration::from_secs(60), TokenType::Refresh)
            .unwrap();
        assert_eq!(
            h.service.refresh(&unrecorded).await.unwrap_err(),
            AuthError::Unauthorized
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_refresh_leaves_one_live_session() {
        let h = harness().await;
        h.service.register("a@x.com", "p1").await.unwrap();
        let pair = h.service.login("a@x.com", "p1").await.unwrap();

        let first = {
            let service = h.service.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { service.refresh(&token).await })
        };
        let second = {
            let service = h.service.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { service.refresh(&token).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(AuthError::Unauthorized)))
        );
        let issued: Vec<TokenPair> = results.into_iter().filter_map(Result::ok).collect();
        assert_eq!(issued.len(), 1);

        // The winner's token is the live one
        assert!(h.service.refresh(&issued[0].refresh_token).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_logout_during_refresh_wins() {
        let ledger = Arc::new(GatedLedger::default());
        let service = Arc::new(
            AuthService::new(
                Arc::new(Database::in_memory().await.unwrap()),
                ledger.clone(),
                token_manager(),
                AuthSettings::default(),
            )
            .unwrap(),
        );
        let account = service.register("a@x.com", "p1").await.unwrap();
        let pair = service.login("a@x.com", "p1").await.unwrap();

        let pending = {
            let service = service.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { service.refresh(&token).await })
        };

        // Refresh has verified its token and is about to write
        ledger.entered.notified().await;
        service.logout(&pair.refresh_token).await.unwrap();
        ledger.release.notify_one();

        assert_eq!(pending.await.unwrap().unwrap_err(), AuthError::Unauthorized);
        assert!(ledger.inner.get(account.id).await.unwrap().is_none());
        assert!(ledger.inner.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_internal_not_allow() {
        let service = service_with_ledger(Arc::new(UnreachableLedger)).await;
        service.register("a@x.com", "p1").await.unwrap();

        assert!(matches!(
            service.login("a@x.com", "p1").await,
            Err(AuthError::Internal(_))
        ));

        let refresh = service
            .tokens
            .issue(1, Duration::from_secs(60), TokenType::Refresh)
            .unwrap();
        assert!(matches!(
            service.refresh(&refresh).await,
            Err(AuthError::Internal(_))
        ));
        assert!(matches!(
            service.logout(&refresh).await,
            Err(AuthError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_stalled_ledger_times_out() {
        let service = service_with_ledger(Arc::new(StallingLedger::default())).await;
        service.register("a@x.com", "p1").await.unwrap();
        let pair = service.login("a@x.com", "p1").await.unwrap();

        let err = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let db = Database::in_memory().await.unwrap();
        let settings = AuthSettings {
            access_ttl: Duration::from_secs(10),
            refresh_ttl: Duration::from_secs(5),
            ..Default::default()
        };
        let result = AuthService::new(
            Arc::new(db),
            Arc::new(MemoryLedger::new()),
            token_manager(),
            settings,
        );
        assert!(matches!(result, Err(AuthError::Validation(_))));
    }
}
