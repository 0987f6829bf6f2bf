//! Typed error type for the db crate.

use thiserror::Error;

use crate::crypto::CipherError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    /// A unique constraint rejected the write.
    #[error("row already exists")]
    Duplicate,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored column could not be decoded into its domain type.
    #[error("corrupt column '{column}': {message}")]
    Corrupt {
        column: &'static str,
        message: String,
    },

    #[error("credential cipher error: {0}")]
    Cipher(#[from] CipherError),
}

impl DbError {
    /// Classify a failed INSERT/UPDATE: unique violations become
    /// [`DbError::Duplicate`], dangling foreign keys become [`DbError::NotFound`].
    pub(crate) fn from_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::Duplicate;
            }
            if db_err.is_foreign_key_violation() {
                return Self::NotFound;
            }
        }
        Self::Sqlx(err)
    }

    pub(crate) fn corrupt(column: &'static str, message: impl ToString) -> Self {
        Self::Corrupt {
            column,
            message: message.to_string(),
        }
    }
}
