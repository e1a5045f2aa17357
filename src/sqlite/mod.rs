//! SQLite driver and pool factory.
//!
//! Built on rusqlite, with tokio-rusqlite running each connection on its own
//! background thread.

pub mod connection;
pub mod connector;
pub mod error;
pub mod types;


pub use connection::{QueryResult, SqliteConnection};
pub use connector::SqliteConnector;
pub use error::{SqliteError, SqliteResult};
pub use types::SqliteValue;
