//! Error types for the connection pool.

use thiserror::Error;

/// Boxed error produced by a connection factory.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    /// The factory could not establish a session.
    #[error("Failed to establish connection: {0}")]
    ConnectFailed(#[source] BoxError),

    /// Capacity reached and the caller's wait timed out or blocking was disabled.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Connection pool is closed")]
    PoolClosed,

    /// A leased connection reported that its session is unusable.
    #[error("Connection is broken: {0}")]
    ConnectionBroken(String),
}

impl PoolError {
    pub(crate) fn connect_failed<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PoolError::ConnectFailed(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_connect_failed_keeps_source() {
        let err = PoolError::connect_failed(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(err.to_string(), "Failed to establish connection: refused");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_display() {
        assert_eq!(PoolError::PoolClosed.to_string(), "Connection pool is closed");
        assert_eq!(PoolError::PoolExhausted.to_string(), "Connection pool exhausted");
        assert_eq!(
            PoolError::ConnectionBroken("reset by peer".into()).to_string(),
            "Connection is broken: reset by peer"
        );
    }
}
