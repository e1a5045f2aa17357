//! Leases and the guards that keep pool accounting straight when an
//! acquisition is cancelled half way.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::state::{Conn, Grant, Reaped};
use super::PoolInner;
use crate::error::{PoolError, Result};
use crate::factory::ConnectionFactory;

// ============================================================================
// Pooled Connection
// ============================================================================

/// A connection checked out from the pool.
///
/// Derefs to the factory's connection type. When dropped, the connection is
/// returned to the pool; connections the pool decides to retire are closed
/// on the tokio runtime in the background. Use [`release`](Self::release) to
/// wait for that close instead.
pub struct PooledConnection<F: ConnectionFactory> {
    /// The actual connection (None once handed back)
    conn: Option<Conn<F::Connection>>,
    /// Reference back to the pool
    pool: Arc<PoolInner<F>>,
    broken: bool,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    pub(crate) fn new(conn: Conn<F::Connection>, pool: Arc<PoolInner<F>>) -> Self {
        Self {
            conn: Some(conn),
            pool,
            broken: false,
        }
    }

    fn slot(&self) -> &Conn<F::Connection> {
        self.conn
            .as_ref()
            .expect("lease holds its connection until consumed")
    }

    fn slot_mut(&mut self) -> &mut Conn<F::Connection> {
        self.conn
            .as_mut()
            .expect("lease holds its connection until consumed")
    }

    /// Pool-assigned identifier, unique for the lifetime of the pool.
    pub fn id(&self) -> u64 {
        self.slot().id
    }

    /// When the physical connection was opened.
    pub fn created_at(&self) -> Instant {
        self.slot().created_at
    }

    /// When the connection was last handed back to the pool, or opened if
    /// it never was.
    pub fn last_used_at(&self) -> Instant {
        self.slot().last_used_at
    }

    pub fn age(&self) -> Duration {
        self.created_at().elapsed()
    }

    /// Flag the session as unusable so the pool discards it on release.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Round-trip to the server.
    ///
    /// On failure the lease is marked broken and
    /// [`PoolError::ConnectionBroken`] is returned.
    pub async fn ping(&mut self) -> Result<()> {
        let pool = Arc::clone(&self.pool);
        match pool.factory.ping(&mut self.slot_mut().raw).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.broken = true;
                Err(PoolError::ConnectionBroken(err.to_string()))
            }
        }
    }

    /// Return the connection to the pool, waiting for it to be closed if
    /// the pool retires it.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            let reaped = self.pool.checkin(conn, self.broken);
            self.pool.close_all(reaped).await;
        }
    }

    /// Take the connection out of the pool for good.
    ///
    /// The pool stops counting it and may open a replacement.
    pub fn detach(mut self) -> F::Connection {
        let conn = self
            .conn
            .take()
            .expect("lease holds its connection until consumed");
        let ((), reaped) = self.pool.with_state(|s, now, r| s.detach(now, r));
        self.pool.spawn_close(reaped);
        tracing::debug!(conn_id = conn.id, "detached connection from pool");
        conn.raw
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        &self.slot().raw
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slot_mut().raw
    }
}

impl<F: ConnectionFactory> fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.conn.as_ref().map(|c| c.id))
            .field("broken", &self.broken)
            .finish()
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let reaped = self.pool.checkin(conn, self.broken);
            self.pool.spawn_close(reaped);
        }
    }
}

// ============================================================================
// Guards
// ============================================================================

/// A slot counted as open and in use before its connection exists.
///
/// Dropping it unfulfilled gives the slot back and wakes the next waiter.
pub(crate) struct Reservation<'a, F: ConnectionFactory> {
    pool: &'a Arc<PoolInner<F>>,
    armed: bool,
}

impl<'a, F: ConnectionFactory> Reservation<'a, F> {
    pub(crate) fn new(pool: &'a Arc<PoolInner<F>>) -> Self {
        Self { pool, armed: true }
    }

    /// The connection was established and now belongs to a lease.
    pub(crate) fn fulfil(mut self) {
        self.armed = false;
    }

    /// Give the slot back; returns what must be closed.
    pub(crate) fn cancel(mut self) -> Reaped<F::Connection> {
        self.armed = false;
        self.pool.with_state(|s, now, r| s.unreserve(now, r)).1
    }
}

impl<F: ConnectionFactory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            let ((), reaped) = self.pool.with_state(|s, now, r| s.unreserve(now, r));
            self.pool.spawn_close(reaped);
        }
    }
}

/// A place in the waiter queue.
///
/// If the waiting caller goes away, the guard leaves the queue; a grant that
/// already reached it is handed back to the pool.
pub(crate) struct WaitGuard<'a, F: ConnectionFactory> {
    pool: &'a Arc<PoolInner<F>>,
    id: u64,
    rx: Option<oneshot::Receiver<Grant<F::Connection>>>,
}

impl<'a, F: ConnectionFactory> WaitGuard<'a, F> {
    pub(crate) fn new(
        pool: &'a Arc<PoolInner<F>>,
        id: u64,
        rx: oneshot::Receiver<Grant<F::Connection>>,
    ) -> Self {
        Self {
            pool,
            id,
            rx: Some(rx),
        }
    }

    /// Wait for a grant. A dropped sender means the pool shut down.
    pub(crate) async fn wait(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Grant<F::Connection>> {
        let received = {
            let Some(rx) = self.rx.as_mut() else {
                return Err(PoolError::PoolClosed);
            };
            match timeout {
                Some(limit) => tokio::time::timeout(limit, rx).await.ok(),
                None => Some(rx.await),
            }
        };

        match received {
            Some(result) => {
                self.rx = None;
                result.map_err(|_| PoolError::PoolClosed)
            }
            None => {
                let cancelled = self.pool.state.lock().cancel_wait(self.id);
                let rx = self.rx.take();
                if cancelled {
                    tracing::trace!(waiter = self.id, "gave up waiting for a connection");
                    return Err(PoolError::PoolExhausted);
                }
                // Served while the timer fired.
                match rx.map(|mut rx| rx.try_recv()) {
                    Some(Ok(grant)) => Ok(grant),
                    _ => Err(PoolError::PoolClosed),
                }
            }
        }
    }
}

impl<F: ConnectionFactory> Drop for WaitGuard<'_, F> {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        let cancelled = self.pool.state.lock().cancel_wait(self.id);
        if cancelled {
            return;
        }
        if let Ok(grant) = rx.try_recv() {
            self.pool.give_back(grant);
        }
    }
}
