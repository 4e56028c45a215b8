//! Credential store abstraction consumed by the auth flow

use async_trait::async_trait;

use crate::error::DbError;
use crate::models::{Account, NewAccount};
use crate::repository::Database;

/// Durable mapping of account identity to password hash
///
/// Identities passed in are expected to be normalized already.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist a new account, failing with `DbError::Duplicate` if the identity is taken
    async fn create(&self, account: NewAccount) -> Result<Account, DbError>;

    /// Look up an account, failing with `DbError::NotFound` if absent
    async fn find_by_identity(&self, identity: &str) -> Result<Account, DbError>;
}

#[async_trait]
impl CredentialStore for Database {
    async fn create(&self, account: NewAccount) -> Result<Account, DbError> {
        self.insert_account(account).await
    }

    async fn find_by_identity(&self, identity: &str) -> Result<Account, DbError> {
        self.get_account_by_email(identity)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Account '{}'", identity)))
    }
}
