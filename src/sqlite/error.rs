//! SQLite error types.

use thiserror::Error;

use crate::error::PoolError;

pub type SqliteResult<T> = Result<T, SqliteError>;

/// SQLite-specific errors.
#[derive(Error, Debug)]
pub enum SqliteError {
    /// SQLite error from rusqlite
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failure inside the background connection thread
    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Raised while obtaining a connection from the pool
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl From<tokio_rusqlite::Error> for SqliteError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        match e {
            tokio_rusqlite::Error::ConnectionClosed => SqliteError::ConnectionClosed,
            tokio_rusqlite::Error::Rusqlite(e) => SqliteError::Sqlite(e),
            other => SqliteError::Driver(other.to_string()),
        }
    }
}
