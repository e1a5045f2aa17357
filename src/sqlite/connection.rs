//! SQLite connection implementation.

use tokio_rusqlite::Connection;

use super::error::{SqliteError, SqliteResult};
use super::types::SqliteValue;

/// Result of a query execution.
#[derive(Debug, Default)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Row data
    pub rows: Vec<Vec<SqliteValue>>,
    /// Rows affected (for INSERT/UPDATE/DELETE)
    pub rows_affected: u64,
}

impl QueryResult {
    /// First row, if any.
    pub fn first(&self) -> Option<&[SqliteValue]> {
        self.rows.first().map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A SQLite connection.
///
/// Statements run on the connection's background thread. Once the driver
/// reports the connection gone, every further call fails with
/// [`SqliteError::ConnectionClosed`].
pub struct SqliteConnection {
    conn: Connection,
    closed: bool,
    in_transaction: bool,
}

impl SqliteConnection {
    /// Open a SQLite database.
    ///
    /// Supports:
    /// - `:memory:` for in-memory database
    /// - File path for disk-based database
    ///
    /// File-based databases are switched to WAL mode.
    pub async fn open(path: &str) -> SqliteResult<Self> {
        let is_memory = path == ":memory:";
        let conn = if is_memory {
            Connection::open_in_memory().await?
        } else {
            Connection::open(path).await?
        };

        if !is_memory {
            conn.call(|c| {
                c.execute_batch(
                    "PRAGMA journal_mode=WAL;
                     PRAGMA synchronous=NORMAL;
                     PRAGMA busy_timeout=5000;",
                )?;
                Ok(())
            })
            .await?;
        }

        Ok(Self {
            conn,
            closed: false,
            in_transaction: false,
        })
    }

    /// Run `f` on the background thread.
    ///
    /// Transaction state is read back from SQLite after every statement, so a
    /// failed COMMIT or a raw `BEGIN` is tracked as faithfully as `begin`.
    async fn run<T, F>(&mut self, f: F) -> SqliteResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        if self.closed {
            return Err(SqliteError::ConnectionClosed);
        }

        let outcome = self
            .conn
            .call(move |conn| {
                let out = f(conn);
                Ok((out, !conn.is_autocommit()))
            })
            .await;

        match outcome {
            Ok((out, in_transaction)) => {
                self.in_transaction = in_transaction;
                out.map_err(SqliteError::from)
            }
            Err(e) => {
                let err = SqliteError::from(e);
                if matches!(err, SqliteError::ConnectionClosed) {
                    self.closed = true;
                }
                Err(err)
            }
        }
    }

    /// Execute a query and return results.
    pub async fn query(&mut self, sql: &str, params: &[SqliteValue]) -> SqliteResult<QueryResult> {
        let sql = sql.to_string();
        let params: Vec<SqliteValue> = params.to_vec();

        self.run(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

            let mut rows_data = Vec::new();
            let mut rows = stmt.query(params_refs.as_slice())?;
            while let Some(row) = rows.next()? {
                let mut row_values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    row_values.push(SqliteValue::from_value_ref(row.get_ref(i)?));
                }
                rows_data.push(row_values);
            }

            Ok(QueryResult {
                columns,
                rows: rows_data,
                rows_affected: 0,
            })
        })
        .await
    }

    /// Execute a query expected to return at most one row.
    pub async fn query_row(
        &mut self,
        sql: &str,
        params: &[SqliteValue],
    ) -> SqliteResult<Option<Vec<SqliteValue>>> {
        let result = self.query(sql, params).await?;
        Ok(result.rows.into_iter().next())
    }

    /// Execute a statement that doesn't return rows.
    pub async fn execute(&mut self, sql: &str, params: &[SqliteValue]) -> SqliteResult<u64> {
        let sql = sql.to_string();
        let params: Vec<SqliteValue> = params.to_vec();

        self.run(move |conn| {
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
            let rows_affected = conn.execute(&sql, params_refs.as_slice())?;
            Ok(rows_affected as u64)
        })
        .await
    }

    /// Execute multiple statements (for DDL, etc.).
    pub async fn execute_batch(&mut self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        self.run(move |conn| conn.execute_batch(&sql)).await
    }

    /// Start a transaction. Nested transactions are not supported.
    pub async fn begin(&mut self) -> SqliteResult<()> {
        if self.in_transaction {
            return Err(SqliteError::Transaction("transaction already in progress".into()));
        }
        self.execute_batch("BEGIN").await
    }

    /// Commit the open transaction.
    ///
    /// If the commit fails, for instance on a deferred constraint or a busy
    /// database, the transaction stays open and must be rolled back.
    pub async fn commit(&mut self) -> SqliteResult<()> {
        self.finish("COMMIT").await
    }

    pub async fn rollback(&mut self) -> SqliteResult<()> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, stmt: &str) -> SqliteResult<()> {
        if !self.in_transaction {
            return Err(SqliteError::Transaction("no transaction in progress".into()));
        }
        self.execute_batch(stmt).await
    }

    /// Check the connection is still usable.
    pub async fn ping(&mut self) -> SqliteResult<()> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    /// Close the connection, waiting for the background thread to finish.
    pub async fn close(mut self) -> SqliteResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.conn.close().await.map_err(SqliteError::from)
    }

    /// Check if the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether SQLite had a transaction open after the last statement.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}
