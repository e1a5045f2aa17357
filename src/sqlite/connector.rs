//! Pool integration for SQLite.

use async_trait::async_trait;

use super::connection::{QueryResult, SqliteConnection};
use super::error::{SqliteError, SqliteResult};
use super::types::SqliteValue;
use crate::factory::ConnectionFactory;
use crate::pool::Pool;

const MEMORY: &str = ":memory:";

/// Opens SQLite connections for a [`Pool`].
///
/// Every `:memory:` connection is its own private database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConnector {
    path: String,
}

impl SqliteConnector {
    /// Connect to a database file, or `:memory:`.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn memory() -> Self {
        Self::new(MEMORY)
    }

    /// Parse a `sqlite://path` or `sqlite:path` URL.
    ///
    /// An empty path selects an in-memory database.
    pub fn from_url(url: &str) -> SqliteResult<Self> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .ok_or_else(|| SqliteError::InvalidUrl(url.to_string()))?;

        if path.is_empty() {
            return Ok(Self::memory());
        }
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl ConnectionFactory for SqliteConnector {
    type Connection = SqliteConnection;
    type Error = SqliteError;

    async fn connect(&self) -> SqliteResult<SqliteConnection> {
        SqliteConnection::open(&self.path).await
    }

    async fn ping(&self, conn: &mut SqliteConnection) -> SqliteResult<()> {
        conn.ping().await
    }

    /// A connection handed back mid-transaction would leak its open
    /// transaction into the next lease.
    fn has_broken(&self, conn: &mut SqliteConnection) -> bool {
        conn.is_closed() || conn.in_transaction()
    }

    async fn close(&self, conn: SqliteConnection) {
        if let Err(err) = conn.close().await {
            tracing::debug!(error = %err, "error closing sqlite connection");
        }
    }
}

impl Pool<SqliteConnector> {
    /// Run a query on a pooled connection.
    pub async fn query(&self, sql: &str, params: &[SqliteValue]) -> SqliteResult<QueryResult> {
        let mut conn = self.acquire().await?;
        let result = conn.query(sql, params).await;
        conn.release().await;
        result
    }

    /// Run a query expected to return at most one row.
    pub async fn query_row(
        &self,
        sql: &str,
        params: &[SqliteValue],
    ) -> SqliteResult<Option<Vec<SqliteValue>>> {
        let mut conn = self.acquire().await?;
        let result = conn.query_row(sql, params).await;
        conn.release().await;
        result
    }

    /// Execute a statement on a pooled connection, returning rows affected.
    pub async fn execute(&self, sql: &str, params: &[SqliteValue]) -> SqliteResult<u64> {
        let mut conn = self.acquire().await?;
        let result = conn.execute(sql, params).await;
        conn.release().await;
        result
    }
}
