//! The seam between the pool and whatever dials physical connections.

use async_trait::async_trait;

/// Creates, checks and closes physical connections on behalf of a [`Pool`].
///
/// The pool never holds its lock while calling into the factory, so every
/// method may block on network or disk I/O.
///
/// [`Pool`]: crate::Pool
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// A live session with the database.
    type Connection: Send + 'static;

    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish a new session.
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Round-trip to the server to check the session is alive.
    async fn ping(&self, _conn: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Cheap, synchronous check run when a lease is returned.
    ///
    /// Returning `true` makes the pool discard the connection instead of
    /// keeping it idle.
    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }

    /// Tear down a session the pool no longer wants.
    async fn close(&self, conn: Self::Connection) {
        drop(conn);
    }
}
