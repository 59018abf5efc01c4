//! Repository error type.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use ringi_core::workflow::WorkflowError;

/// Error types for workflow repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// A stored row could not be mapped back to its domain record.
    #[error("Corrupt {table} row {key}: {reason}")]
    Corrupt {
        /// Table name.
        table: &'static str,
        /// Row key.
        key: String,
        /// What failed to decode.
        reason: String,
    },
}

impl RepositoryError {
    pub(crate) fn corrupt(table: &'static str, key: &str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true if the database rejected a duplicate key.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::Database(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        )
    }
}

impl From<RepositoryError> for WorkflowError {
    fn from(err: RepositoryError) -> Self {
        Self::Database(err.to_string())
    }
}
