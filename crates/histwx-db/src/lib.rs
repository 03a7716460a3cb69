//! MySQL access layer for the `hourly_weather` / `daily_weather` tables
//!
//! Assumes the schema already exists; this crate never issues DDL.

pub mod client;
pub mod queries;
pub mod schema;
mod store;

pub use client::*;
pub use schema::*;

use histwx_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl DbError {
    /// True when the failure is about reaching the server, not about one statement
    pub fn is_connection_error(&self) -> bool {
        match self {
            DbError::Sqlx(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Configuration(_)
            ),
            DbError::ConfigError(_) => true,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if err.is_connection_error() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Rejected(err.to_string())
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let down: StoreError = DbError::Sqlx(sqlx::Error::PoolTimedOut).into();
        assert!(down.is_unavailable());

        let missing: StoreError = DbError::Sqlx(sqlx::Error::RowNotFound).into();
        assert!(!missing.is_unavailable());

        let config: StoreError = DbError::ConfigError("no url".into()).into();
        assert!(config.is_unavailable());
    }
}
