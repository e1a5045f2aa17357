//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Idle connections kept by default, matching what most SQL drivers ship with.
const DEFAULT_MAX_IDLE: usize = 2;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 30_000;

/// Configuration for a connection pool.
///
/// Controls pool sizing, acquisition timeouts and connection lifetime. Every
/// limit can also be changed on a running pool; see [`Pool::set_max_open`]
/// and friends.
///
/// [`Pool::set_max_open`]: super::Pool::set_max_open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Hard cap on simultaneously open connections, 0 for unbounded
    max_open: usize,
    /// Cap on connections kept warm while unused
    max_idle: usize,
    /// Connections opened eagerly by `Pool::connect`
    min_idle: usize,
    /// Age in milliseconds after which a connection is retired
    max_lifetime_ms: Option<u64>,
    /// How long `acquire` waits for capacity, `None` to wait indefinitely
    acquire_timeout_ms: Option<u64>,
}

impl PoolConfig {
    /// Create a configuration with the default limits.
    pub fn new() -> Self {
        Self {
            max_open: 0,
            max_idle: DEFAULT_MAX_IDLE,
            min_idle: 0,
            max_lifetime_ms: None,
            acquire_timeout_ms: Some(DEFAULT_ACQUIRE_TIMEOUT_MS),
        }
    }

    /// Set the maximum number of open connections (0 = unbounded).
    pub fn with_max_open(mut self, max: usize) -> Self {
        self.max_open = max;
        self
    }

    /// Set the maximum number of idle connections.
    pub fn with_max_idle(mut self, max: usize) -> Self {
        self.max_idle = max;
        self
    }

    /// Set how many connections `Pool::connect` opens up front.
    pub fn with_min_idle(mut self, min: usize) -> Self {
        self.min_idle = min;
        self
    }

    /// Set the maximum connection lifetime. `Duration::ZERO` means unbounded.
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime_ms = non_zero_ms(lifetime);
        self
    }

    /// Set the acquire timeout. `None` waits indefinitely.
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout_ms = timeout.map(ceil_ms);
        self
    }

    pub fn max_open(&self) -> usize {
        self.max_open
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    pub fn min_idle(&self) -> usize {
        self.min_idle
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for PoolConfig {
    /// Defaults:
    /// - max_open: 0 (unbounded)
    /// - max_idle: 2
    /// - min_idle: 0
    /// - max_lifetime: None
    /// - acquire_timeout: 30 seconds
    fn default() -> Self {
        Self::new()
    }
}

/// Whole milliseconds, rounded up so sub-millisecond values stay non-zero.
fn ceil_ms(d: Duration) -> u64 {
    u64::try_from(d.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

fn non_zero_ms(d: Duration) -> Option<u64> {
    (!d.is_zero()).then(|| ceil_ms(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_open(), 0);
        assert_eq!(config.max_idle(), 2);
        assert_eq!(config.min_idle(), 0);
        assert!(config.max_lifetime().is_none());
        assert_eq!(config.acquire_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .with_max_open(50)
            .with_max_idle(10)
            .with_min_idle(1)
            .with_max_lifetime(Duration::from_secs(60))
            .with_acquire_timeout(None);

        assert_eq!(config.max_open(), 50);
        assert_eq!(config.max_idle(), 10);
        assert_eq!(config.min_idle(), 1);
        assert_eq!(config.max_lifetime(), Some(Duration::from_secs(60)));
        assert!(config.acquire_timeout().is_none());
    }

    #[test]
    fn test_zero_lifetime_is_unbounded() {
        let config = PoolConfig::new()
            .with_max_lifetime(Duration::from_secs(5))
            .with_max_lifetime(Duration::ZERO);
        assert!(config.max_lifetime().is_none());
    }

    #[test]
    fn test_sub_millisecond_durations_round_up() {
        let config = PoolConfig::new()
            .with_max_lifetime(Duration::from_micros(300))
            .with_acquire_timeout(Some(Duration::from_micros(300)));
        assert_eq!(config.max_lifetime(), Some(Duration::from_millis(1)));
        assert_eq!(config.acquire_timeout(), Some(Duration::from_millis(1)));

        let config = PoolConfig::new().with_acquire_timeout(Some(Duration::from_micros(1500)));
        assert_eq!(config.acquire_timeout(), Some(Duration::from_millis(2)));

        let config = PoolConfig::new().with_acquire_timeout(Some(Duration::ZERO));
        assert_eq!(config.acquire_timeout(), Some(Duration::ZERO));
    }

    #[test]
    fn test_pool_config_from_partial_json() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"max_open": 50, "max_idle": 10}"#).expect("deserialize");
        assert_eq!(config.max_open(), 50);
        assert_eq!(config.max_idle(), 10);
        assert_eq!(config.acquire_timeout(), Some(Duration::from_secs(30)));

        let json = serde_json::to_string(&config).expect("serialize");
        let back: PoolConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, config);
    }
}
