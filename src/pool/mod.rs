//! Connection pool with open, idle and lifetime limits.
//!
//! The pool lends physical connections produced by a [`ConnectionFactory`]
//! and takes them back when the lease is dropped or explicitly released:
//!
//! ```ignore
//! use poolkit::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new().with_max_open(50).with_max_idle(10);
//! let pool = Pool::new(factory, config);
//!
//! let conn = pool.acquire().await?;
//! // Use connection...
//! conn.release().await;
//! ```
//!
//! All bookkeeping lives behind a single mutex that is never held while the
//! factory dials, pings or closes a connection. Callers that find the pool at
//! capacity queue up and are served strictly in arrival order.

mod config;
mod lease;
mod state;
mod stats;


pub use config::PoolConfig;
pub use lease::PooledConnection;
pub use stats::PoolStats;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{PoolError, Result};
use crate::factory::ConnectionFactory;
use lease::{Reservation, WaitGuard};
use state::{Checkout, Conn, Grant, PoolState, Reaped};

// ============================================================================
// Pool Inner
// ============================================================================

/// State shared between the pool handle and every lease.
pub(crate) struct PoolInner<F: ConnectionFactory> {
    factory: F,
    state: Mutex<PoolState<F::Connection>>,
    /// Default wait for `acquire`
    acquire_timeout: Option<Duration>,
    next_conn_id: AtomicU64,
    /// Signalled whenever a closed pool gives up a connection
    released: Notify,
}

impl<F: ConnectionFactory> PoolInner<F> {
    /// Run `f` under the state lock, collecting connections to close.
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut PoolState<F::Connection>, Instant, &mut Reaped<F::Connection>) -> T,
    ) -> (T, Reaped<F::Connection>) {
        let mut reaped = Vec::new();
        let (out, closed) = {
            let mut state = self.state.lock();
            let out = f(&mut state, Instant::now(), &mut reaped);
            (out, state.is_closed())
        };
        if closed {
            self.released.notify_waiters();
        }
        (out, reaped)
    }

    async fn close_all(&self, reaped: Reaped<F::Connection>) {
        for (conn, reason) in reaped {
            tracing::debug!(conn_id = conn.id, %reason, "closing connection");
            self.factory.close(conn.raw).await;
        }
    }

    /// Close connections from a synchronous context such as `Drop`.
    fn spawn_close(self: &Arc<Self>, reaped: Reaped<F::Connection>) {
        if reaped.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = Arc::clone(self);
                handle.spawn(async move {
                    pool.close_all(reaped).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    count = reaped.len(),
                    "no tokio runtime available, dropping connections without closing them"
                );
            }
        }
    }

    /// Take a lease back. Returns what must be closed.
    fn checkin(&self, mut conn: Conn<F::Connection>, broken: bool) -> Reaped<F::Connection> {
        let broken = broken || self.factory.has_broken(&mut conn.raw);
        let ((), reaped) = self.with_state(|s, now, r| s.checkin(conn, broken, now, r));
        reaped
    }

    /// Return a grant that reached a waiter which is no longer listening.
    fn give_back(self: &Arc<Self>, grant: Grant<F::Connection>) {
        let reaped = match grant {
            Grant::Reuse(conn) => self.checkin(conn, false),
            Grant::Create => self.with_state(|s, now, r| s.unreserve(now, r)).1,
        };
        self.spawn_close(reaped);
    }

    /// Turn a reserved slot into a live connection.
    async fn dial(
        self: &Arc<Self>,
        reservation: Reservation<'_, F>,
    ) -> Result<PooledConnection<F>> {
        let raw = match self.factory.connect().await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(error = %err, "failed to open connection");
                let reaped = reservation.cancel();
                self.close_all(reaped).await;
                return Err(PoolError::connect_failed(err));
            }
        };
        reservation.fulfil();

        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(conn_id = id, "opened connection");
        let lease = PooledConnection::new(Conn::new(raw, id, Instant::now()), Arc::clone(self));

        // Shut down while we were dialing.
        let closed = self.state.lock().is_closed();
        if closed {
            lease.release().await;
            return Err(PoolError::PoolClosed);
        }
        Ok(lease)
    }
}

// ============================================================================
// Connection Pool
// ============================================================================

/// A pool of connections produced by a [`ConnectionFactory`].
///
/// Cloning is cheap; every clone refers to the same pool.
pub struct Pool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("stats", &self.stats()).finish()
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a pool without opening any connection.
    pub fn new(factory: F, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState::new(&config)),
                acquire_timeout: config.acquire_timeout(),
                factory,
                next_conn_id: AtomicU64::new(1),
                released: Notify::new(),
            }),
        }
    }

    /// Create a pool and open `min_idle` connections up front.
    ///
    /// Fails with [`PoolError::ConnectFailed`] if any of them cannot be
    /// established; connections opened so far are closed.
    pub async fn connect(factory: F, config: PoolConfig) -> Result<Self> {
        let min_idle = config.min_idle();
        let pool = Self::new(factory, config);
        let warm = min_idle.min(pool.inner.state.lock().effective_max_idle());

        for _ in 0..warm {
            let raw = match pool.inner.factory.connect().await {
                Ok(raw) => raw,
                Err(err) => {
                    pool.shutdown(Duration::ZERO).await;
                    return Err(PoolError::connect_failed(err));
                }
            };
            let id = pool.inner.next_conn_id.fetch_add(1, Ordering::Relaxed);
            let ((), reaped) = pool
                .inner
                .with_state(|s, now, r| s.adopt_idle(Conn::new(raw, id, now), r));
            pool.inner.close_all(reaped).await;
        }

        tracing::debug!(idle = pool.stats().idle, "connection pool ready");
        Ok(pool)
    }

    /// Get a connection, waiting up to the configured acquire timeout.
    pub async fn acquire(&self) -> Result<PooledConnection<F>> {
        self.checkout(true, self.inner.acquire_timeout).await
    }

    /// Get a connection, waiting at most `timeout` for capacity.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<F>> {
        self.checkout(true, Some(timeout)).await
    }

    /// Get a connection without waiting.
    ///
    /// Fails with [`PoolError::PoolExhausted`] when the pool is at capacity.
    pub async fn try_acquire(&self) -> Result<PooledConnection<F>> {
        self.checkout(false, None).await
    }

    async fn checkout(
        &self,
        block: bool,
        timeout: Option<Duration>,
    ) -> Result<PooledConnection<F>> {
        let inner = &self.inner;
        let (outcome, reaped) = inner.with_state(|s, now, r| s.checkout(now, block, r));

        match outcome {
            Checkout::Ready(conn) => {
                let lease = PooledConnection::new(conn, Arc::clone(inner));
                inner.close_all(reaped).await;
                Ok(lease)
            }
            Checkout::Create => {
                let reservation = Reservation::new(inner);
                inner.close_all(reaped).await;
                inner.dial(reservation).await
            }
            Checkout::Wait(id, rx) => {
                tracing::trace!(waiter = id, "pool at capacity, waiting");
                let mut guard = WaitGuard::new(inner, id, rx);
                inner.close_all(reaped).await;
                match guard.wait(timeout).await? {
                    Grant::Reuse(conn) => Ok(PooledConnection::new(conn, Arc::clone(inner))),
                    Grant::Create => inner.dial(Reservation::new(inner)).await,
                }
            }
            Checkout::Exhausted => {
                inner.close_all(reaped).await;
                Err(PoolError::PoolExhausted)
            }
            Checkout::Closed => Err(PoolError::PoolClosed),
        }
    }

    /// Check that a connection can be obtained and answers a ping.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.acquire().await?;
        let result = conn.ping().await;
        conn.release().await;
        result
    }

    /// Current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.inner.state.lock().stats()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().is_closed()
    }

    /// The factory this pool dials through.
    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    /// Change the open limit (0 = unbounded).
    ///
    /// Leased connections are never closed by lowering the limit; new
    /// acquisitions simply wait until usage drops. Raising it serves queued
    /// callers right away.
    pub async fn set_max_open(&self, max: usize) {
        let ((), reaped) = self.inner.with_state(|s, now, r| s.set_max_open(max, now, r));
        self.inner.close_all(reaped).await;
    }

    /// Change the idle limit, closing surplus idle connections immediately.
    pub async fn set_max_idle(&self, max: usize) {
        let ((), reaped) = self.inner.with_state(|s, _, r| s.set_max_idle(max, r));
        self.inner.close_all(reaped).await;
    }

    /// Change the maximum connection lifetime. `Duration::ZERO` means unbounded.
    ///
    /// Takes effect on the next acquire or release.
    pub fn set_max_lifetime(&self, lifetime: Duration) {
        let lifetime = (!lifetime.is_zero()).then_some(lifetime);
        self.inner.state.lock().set_max_lifetime(lifetime);
    }

    /// Close the pool.
    ///
    /// Further acquisitions fail with [`PoolError::PoolClosed`], queued
    /// callers are woken with the same error and idle connections are closed
    /// at once. Leased connections are closed as they come back; this waits up
    /// to `grace` for that to happen and returns the final statistics.
    pub async fn shutdown(&self, grace: Duration) -> PoolStats {
        let ((), reaped) = self.inner.with_state(|s, _, r| s.shutdown(r));
        tracing::debug!(idle = reaped.len(), "shutting down connection pool");
        self.inner.close_all(reaped).await;

        let deadline = Instant::now() + grace;
        loop {
            let released = self.inner.released.notified();
            let open = self.inner.state.lock().open();
            if open == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline, released).await.is_err() {
                break;
            }
        }

        let stats = self.stats();
        if stats.open > 0 {
            tracing::warn!(
                outstanding = stats.open,
                "grace period elapsed, leased connections will close on release"
            );
        }
        stats
    }
}
