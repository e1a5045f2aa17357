//! Pool statistics types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of a pool, observed under a single lock acquisition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Configured open limit (0 = unbounded)
    pub max_open: usize,
    /// Connections currently open, leased or idle (includes slots being dialed)
    pub open: usize,
    /// Connections leased to callers
    pub in_use: usize,
    /// Connections waiting for reuse
    pub idle: usize,
    /// Callers parked waiting for capacity
    pub waiters: usize,

    /// Total number of acquisitions that had to wait
    pub wait_count: u64,
    /// Total time spent waiting by callers that were served
    pub wait_duration: Duration,
    /// Connections closed because the idle set was full
    pub max_idle_closed: u64,
    /// Connections closed because they outlived `max_lifetime`
    pub max_lifetime_closed: u64,
}

impl PoolStats {
    /// Share of open connections that are leased, from 0.0 to 1.0.
    pub fn utilization(&self) -> f64 {
        if self.open == 0 {
            0.0
        } else {
            self.in_use as f64 / self.open as f64
        }
    }

    /// True when the open limit is reached and nothing is idle.
    pub fn is_saturated(&self) -> bool {
        self.max_open > 0 && self.open >= self.max_open && self.idle == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization() {
        let stats = PoolStats {
            open: 4,
            in_use: 1,
            idle: 3,
            ..Default::default()
        };
        assert!((stats.utilization() - 0.25).abs() < f64::EPSILON);
        assert_eq!(PoolStats::default().utilization(), 0.0);
    }

    #[test]
    fn test_is_saturated() {
        let stats = PoolStats {
            max_open: 2,
            open: 2,
            in_use: 2,
            ..Default::default()
        };
        assert!(stats.is_saturated());

        let unbounded = PoolStats {
            open: 2,
            in_use: 2,
            ..Default::default()
        };
        assert!(!unbounded.is_saturated());
    }
}
