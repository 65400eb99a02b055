//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tarn_core::{Result, TarnError};

/// Placeholder ping query; a probe that runs it is expected to fail.
pub const DEFAULT_PING_QUERY: &str = "NO PING QUERY SET";

/// Configuration for a connection pool
///
/// Controls pool sizing, checkout and wait timeouts, bad-connection
/// tolerance and the liveness probe. Changing any of these on a live pool
/// (except the tolerance) closes every pooled connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections checked out at once
    max_active: usize,
    /// Maximum number of idle connections kept for reuse
    max_idle: usize,
    /// Checkout time in milliseconds after which a connection may be reclaimed
    max_checkout_time_ms: u64,
    /// Time in milliseconds a caller waits before re-checking the pool
    max_wait_ms: u64,
    /// Extra bad connections tolerated per acquisition, on top of `max_idle`
    bad_connection_tolerance: usize,
    /// Whether the ping query is run against long-unused connections
    ping_enabled: bool,
    /// Query used as the liveness probe
    ping_query: String,
    /// Idle time in milliseconds after which a connection is probed; `None` never probes
    ping_idle_threshold_ms: Option<u64>,
}

impl PoolConfig {
    /// Create a new pool configuration with the given active and idle limits
    ///
    /// # Panics
    ///
    /// Panics if `max_active` is 0.
    pub fn new(max_active: usize, max_idle: usize) -> Self {
        assert!(
            max_active > 0,
            "max_active must be greater than 0, got {}",
            max_active
        );

        Self {
            max_active,
            max_idle,
            max_checkout_time_ms: 20_000,
            max_wait_ms: 20_000,
            bad_connection_tolerance: 3,
            ping_enabled: false,
            ping_query: DEFAULT_PING_QUERY.to_string(),
            ping_idle_threshold_ms: Some(0),
        }
    }

    /// Parse and validate a configuration from a TOML document
    ///
    /// Missing keys take their default values.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check limits that cannot be enforced by the type system
    pub fn validate(&self) -> Result<()> {
        if self.max_active == 0 {
            return Err(TarnError::Configuration(
                "max_active must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Set the checkout time after which a connection becomes reclaimable
    pub fn with_max_checkout_time_ms(mut self, timeout_ms: u64) -> Self {
        self.max_checkout_time_ms = timeout_ms;
        self
    }

    /// Set how long a blocked caller waits before re-checking the pool
    pub fn with_max_wait_ms(mut self, timeout_ms: u64) -> Self {
        self.max_wait_ms = timeout_ms;
        self
    }

    pub fn with_bad_connection_tolerance(mut self, tolerance: usize) -> Self {
        self.bad_connection_tolerance = tolerance;
        self
    }

    pub fn with_ping_enabled(mut self, enabled: bool) -> Self {
        self.ping_enabled = enabled;
        self
    }

    pub fn with_ping_query(mut self, query: impl Into<String>) -> Self {
        self.ping_query = query.into();
        self
    }

    /// Probe connections that have been unused for longer than this
    pub fn with_ping_idle_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.ping_idle_threshold_ms = Some(threshold_ms);
        self
    }

    /// Never probe, even when pinging is enabled
    pub fn without_ping_idle_threshold(mut self) -> Self {
        self.ping_idle_threshold_ms = None;
        self
    }

    /// Get the maximum number of checked-out connections
    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Get the maximum number of idle connections
    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    /// Get the maximum checkout time as a Duration
    pub fn max_checkout_time(&self) -> Duration {
        Duration::from_millis(self.max_checkout_time_ms)
    }

    /// Get the wait interval as a Duration
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn bad_connection_tolerance(&self) -> usize {
        self.bad_connection_tolerance
    }

    /// Bad connections one acquisition may see before giving up
    pub fn bad_connection_limit(&self) -> usize {
        self.max_idle + self.bad_connection_tolerance
    }

    pub fn ping_enabled(&self) -> bool {
        self.ping_enabled
    }

    pub fn ping_query(&self) -> &str {
        &self.ping_query
    }

    /// Get the ping idle threshold as a Duration if set
    pub fn ping_idle_threshold(&self) -> Option<Duration> {
        self.ping_idle_threshold_ms.map(Duration::from_millis)
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - max_active: 10
    /// - max_idle: 5
    /// - max_checkout_time: 20 seconds
    /// - max_wait: 20 seconds
    /// - bad_connection_tolerance: 3
    /// - ping disabled, threshold 0
    fn default() -> Self {
        Self::new(10, 5)
    }
}
