//! Account operations

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::models::{Account, NewAccount};
use crate::repository::Database;

impl Database {
    /// Insert a new account
    pub async fn insert_account(&self, account: NewAccount) -> Result<Account, DbError> {
        let now = Utc::now();

        if self.get_account_by_email(&account.email).await?.is_some() {
            return Err(DbError::Duplicate(format!(
                "Account '{}' already exists",
                account.email
            )));
        }

        // A concurrent insert can still slip past the check above; the UNIQUE
        // constraint catches it.
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (email, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            DbError::from_insert(e, &format!("Account '{}' already exists", account.email))
        })?;

        let id: i64 = result.get("id");

        Ok(Account {
            id,
            email: account.email,
            password_hash: account.password_hash,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get an account by email
    pub async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, DbError> {
        let result = sqlx::query(
            r#"
            SELECT id, email, password_hash, created_at, updated_at
            FROM accounts
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        result
            .map(|row| Account::try_from(&row).map_err(DbError::from))
            .transpose()
    }

    /// Count registered accounts
    pub async fn count_accounts(&self) -> Result<i64, DbError> {
        let result = sqlx::query("SELECT COUNT(*) as count FROM accounts")
            .fetch_one(&self.pool)
            .await?;
        Ok(result.get("count"))
    }
}
