//! Database error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl DbError {
    /// Classify a failed insert, mapping UNIQUE violations to `Duplicate`
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        let unique = matches!(&err, sqlx::Error::Database(db_err) if db_err.is_unique_violation());
        if unique {
            DbError::Duplicate(what.to_string())
        } else {
            DbError::Connection(err)
        }
    }
}
