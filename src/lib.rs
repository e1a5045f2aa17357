//! Async connection pooling with open, idle and lifetime limits.
//!
//! A [`Pool`] lends connections produced by any [`ConnectionFactory`]:
//!
//! - at most `max_open` connections exist at once; callers beyond that wait
//!   in arrival order, bounded by an acquire timeout
//! - up to `max_idle` released connections are kept for reuse, most recently
//!   used first
//! - connections older than `max_lifetime` are retired on their next trip
//!   through the pool
//!
//! The [`sqlite`] module provides a ready-made factory for SQLite databases.

mod error;
pub mod factory;
pub mod pool;
pub mod sqlite;
pub mod wall_clock;

pub use error::{BoxError, PoolError, Result};
pub use factory::ConnectionFactory;
pub use pool::{Pool, PoolConfig, PoolStats, PooledConnection};
