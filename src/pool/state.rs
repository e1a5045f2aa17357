//! Lock-protected pool bookkeeping.
//!
//! Everything in here is synchronous and runs with the pool mutex held. It
//! never touches the factory: connections that must be closed are handed
//! back to the caller in a [`Reaped`] list and closed after the lock is
//! released.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::config::PoolConfig;
use super::stats::PoolStats;

/// A physical connection plus the metadata the pool tracks for it.
pub(crate) struct Conn<C> {
    pub(crate) raw: C,
    pub(crate) id: u64,
    pub(crate) created_at: Instant,
    pub(crate) last_used_at: Instant,
}

impl<C> Conn<C> {
    pub(crate) fn new(raw: C, id: u64, now: Instant) -> Self {
        Self {
            raw,
            id,
            created_at: now,
            last_used_at: now,
        }
    }

    fn is_expired(&self, max_lifetime: Option<Duration>, now: Instant) -> bool {
        max_lifetime.is_some_and(|limit| now.saturating_duration_since(self.created_at) > limit)
    }
}

/// Why a connection left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    Expired,
    IdleLimit,
    Broken,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CloseReason::Expired => "max lifetime exceeded",
            CloseReason::IdleLimit => "idle limit reached",
            CloseReason::Broken => "broken",
            CloseReason::Shutdown => "pool shut down",
        })
    }
}

/// Connections already removed from the counts, waiting to be closed.
pub(crate) type Reaped<C> = Vec<(Conn<C>, CloseReason)>;

/// What a parked caller receives when capacity frees up.
pub(crate) enum Grant<C> {
    /// An idle connection, already counted as in use.
    Reuse(Conn<C>),
    /// A reserved slot; the waiter must dial the connection itself.
    Create,
}

struct Waiter<C> {
    id: u64,
    tx: oneshot::Sender<Grant<C>>,
    since: Instant,
}

/// Result of trying to check a connection out.
pub(crate) enum Checkout<C> {
    Ready(Conn<C>),
    /// A slot was reserved; dial outside the lock.
    Create,
    Wait(u64, oneshot::Receiver<Grant<C>>),
    Exhausted,
    Closed,
}

pub(crate) struct PoolState<C> {
    idle: VecDeque<Conn<C>>,
    waiters: VecDeque<Waiter<C>>,
    open: usize,
    in_use: usize,
    max_open: usize,
    max_idle: usize,
    max_lifetime: Option<Duration>,
    closed: bool,
    next_waiter_id: u64,

    wait_count: u64,
    wait_duration: Duration,
    max_idle_closed: u64,
    max_lifetime_closed: u64,
}

impl<C> PoolState<C> {
    pub(crate) fn new(config: &PoolConfig) -> Self {
        Self {
            idle: VecDeque::new(),
            waiters: VecDeque::new(),
            open: 0,
            in_use: 0,
            max_open: config.max_open(),
            max_idle: config.max_idle(),
            max_lifetime: config.max_lifetime(),
            closed: false,
            next_waiter_id: 0,
            wait_count: 0,
            wait_duration: Duration::ZERO,
            max_idle_closed: 0,
            max_lifetime_closed: 0,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn open(&self) -> usize {
        self.open
    }

    /// The idle cap never exceeds the open cap.
    pub(crate) fn effective_max_idle(&self) -> usize {
        if self.max_open > 0 {
            self.max_idle.min(self.max_open)
        } else {
            self.max_idle
        }
    }

    fn has_capacity(&self) -> bool {
        self.max_open == 0 || self.open < self.max_open
    }

    /// Pop the most recently returned idle connection that is still fresh,
    /// reaping stale ones on the way.
    fn take_fresh_idle(&mut self, now: Instant, reaped: &mut Reaped<C>) -> Option<Conn<C>> {
        while let Some(conn) = self.idle.pop_back() {
            if conn.is_expired(self.max_lifetime, now) {
                self.open -= 1;
                self.max_lifetime_closed += 1;
                reaped.push((conn, CloseReason::Expired));
                continue;
            }
            return Some(conn);
        }
        None
    }

    pub(crate) fn checkout(
        &mut self,
        now: Instant,
        block: bool,
        reaped: &mut Reaped<C>,
    ) -> Checkout<C> {
        if self.closed {
            return Checkout::Closed;
        }

        // Newcomers never overtake callers already queued.
        if self.waiters.is_empty() {
            if let Some(conn) = self.take_fresh_idle(now, reaped) {
                self.in_use += 1;
                return Checkout::Ready(conn);
            }
            if self.has_capacity() {
                self.open += 1;
                self.in_use += 1;
                return Checkout::Create;
            }
        }

        if !block {
            return Checkout::Exhausted;
        }

        let (tx, rx) = oneshot::channel();
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        self.wait_count += 1;
        self.waiters.push_back(Waiter { id, tx, since: now });
        Checkout::Wait(id, rx)
    }

    /// Return a leased connection.
    pub(crate) fn checkin(
        &mut self,
        mut conn: Conn<C>,
        broken: bool,
        now: Instant,
        reaped: &mut Reaped<C>,
    ) {
        self.in_use -= 1;

        if broken || self.closed {
            self.open -= 1;
            let reason = if broken { CloseReason::Broken } else { CloseReason::Shutdown };
            reaped.push((conn, reason));
        } else if conn.is_expired(self.max_lifetime, now) {
            self.open -= 1;
            self.max_lifetime_closed += 1;
            reaped.push((conn, CloseReason::Expired));
        } else if self.waiters.is_empty() && self.idle.len() >= self.effective_max_idle() {
            self.open -= 1;
            self.max_idle_closed += 1;
            reaped.push((conn, CloseReason::IdleLimit));
        } else {
            conn.last_used_at = now;
            self.idle.push_back(conn);
        }

        self.dispatch(now, reaped);
        self.trim_idle(reaped);
    }

    /// Give back a creation slot that was never turned into a connection.
    pub(crate) fn unreserve(&mut self, now: Instant, reaped: &mut Reaped<C>) {
        self.open -= 1;
        self.in_use -= 1;
        self.dispatch(now, reaped);
    }

    /// Forget a leased connection entirely, freeing its slot.
    pub(crate) fn detach(&mut self, now: Instant, reaped: &mut Reaped<C>) {
        self.unreserve(now, reaped);
    }

    /// Record a connection opened outside of any lease (pool warm-up).
    pub(crate) fn adopt_idle(&mut self, conn: Conn<C>, reaped: &mut Reaped<C>) {
        if self.closed {
            reaped.push((conn, CloseReason::Shutdown));
            return;
        }
        if !self.has_capacity() || self.idle.len() >= self.effective_max_idle() {
            self.max_idle_closed += 1;
            reaped.push((conn, CloseReason::IdleLimit));
            return;
        }
        self.open += 1;
        self.idle.push_back(conn);
    }

    /// Serve queued waiters, oldest first, while there is something to give.
    fn dispatch(&mut self, now: Instant, reaped: &mut Reaped<C>) {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.tx.is_closed() {
                continue;
            }

            let grant = match self.take_fresh_idle(now, reaped) {
                Some(conn) => Grant::Reuse(conn),
                None if self.has_capacity() => {
                    self.open += 1;
                    Grant::Create
                }
                None => {
                    self.waiters.push_front(waiter);
                    break;
                }
            };

            self.in_use += 1;
            self.wait_duration += now.saturating_duration_since(waiter.since);
            tracing::trace!(waiter = waiter.id, "granting capacity to waiter");

            if let Err(grant) = waiter.tx.send(grant) {
                self.in_use -= 1;
                match grant {
                    Grant::Reuse(conn) => self.idle.push_back(conn),
                    Grant::Create => self.open -= 1,
                }
            }
        }
    }

    /// Drop a waiter that gave up. Returns false when it had already been
    /// granted something, in which case the grant sits in its channel.
    pub(crate) fn cancel_wait(&mut self, id: u64) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_max_open(&mut self, max: usize, now: Instant, reaped: &mut Reaped<C>) {
        self.max_open = max;
        self.trim_idle(reaped);
        self.dispatch(now, reaped);
    }

    pub(crate) fn set_max_idle(&mut self, max: usize, reaped: &mut Reaped<C>) {
        self.max_idle = max;
        self.trim_idle(reaped);
    }

    pub(crate) fn set_max_lifetime(&mut self, lifetime: Option<Duration>) {
        self.max_lifetime = lifetime;
    }

    /// Close the oldest idle connections until the idle cap holds.
    fn trim_idle(&mut self, reaped: &mut Reaped<C>) {
        let cap = self.effective_max_idle();
        while self.idle.len() > cap {
            if let Some(conn) = self.idle.pop_front() {
                self.open -= 1;
                self.max_idle_closed += 1;
                reaped.push((conn, CloseReason::IdleLimit));
            }
        }
    }

    /// Refuse further checkouts, hand back every idle connection and wake
    /// all waiters. Waiters observe their sender being dropped.
    pub(crate) fn shutdown(&mut self, reaped: &mut Reaped<C>) {
        self.closed = true;
        self.open -= self.idle.len();
        reaped.extend(self.idle.drain(..).map(|c| (c, CloseReason::Shutdown)));
        self.waiters.clear();
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            max_open: self.max_open,
            open: self.open,
            in_use: self.in_use,
            idle: self.idle.len(),
            waiters: self.waiters.iter().filter(|w| !w.tx.is_closed()).count(),
            wait_count: self.wait_count,
            wait_duration: self.wait_duration,
            max_idle_closed: self.max_idle_closed,
            max_lifetime_closed: self.max_lifetime_closed,
        }
    }
}
