//! Pool statistics types

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Running counters kept under the pool lock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PoolCounters {
    pub(crate) request_count: u64,
    pub(crate) accumulated_request_time: Duration,
    pub(crate) had_to_wait_count: u64,
    pub(crate) accumulated_wait_time: Duration,
    pub(crate) accumulated_checkout_time: Duration,
    pub(crate) claimed_overdue_count: u64,
    pub(crate) accumulated_overdue_checkout_time: Duration,
    pub(crate) bad_connection_count: u64,
}

/// Snapshot of a connection pool's state and history
///
/// Counters accumulate for the lifetime of the pool and survive resets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of idle connections available in the pool
    idle: usize,
    /// Number of connections currently checked out
    active: usize,
    /// Number of callers blocked waiting for a connection
    waiting: usize,
    /// Number of successful checkouts
    request_count: u64,
    /// Total time spent inside successful checkouts
    accumulated_request_time: Duration,
    /// Number of checkouts that had to block at least once
    had_to_wait_count: u64,
    /// Total time callers spent blocked
    accumulated_wait_time: Duration,
    /// Total time connections spent checked out
    accumulated_checkout_time: Duration,
    /// Number of overdue connections reclaimed
    claimed_overdue_count: u64,
    /// Checkout time of reclaimed connections at the moment they were reclaimed
    accumulated_overdue_checkout_time: Duration,
    /// Number of invalid connections encountered
    bad_connection_count: u64,
}

impl PoolStats {
    pub(crate) fn new(idle: usize, active: usize, waiting: usize, counters: &PoolCounters) -> Self {
        Self {
            idle,
            active,
            waiting,
            request_count: counters.request_count,
            accumulated_request_time: counters.accumulated_request_time,
            had_to_wait_count: counters.had_to_wait_count,
            accumulated_wait_time: counters.accumulated_wait_time,
            accumulated_checkout_time: counters.accumulated_checkout_time,
            claimed_overdue_count: counters.claimed_overdue_count,
            accumulated_overdue_checkout_time: counters.accumulated_overdue_checkout_time,
            bad_connection_count: counters.bad_connection_count,
        }
    }

    /// Get the total number of pooled connections (idle + active)
    pub fn total(&self) -> usize {
        self.idle + self.active
    }

    /// Get the number of idle connections
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Get the number of active (checked out) connections
    pub fn active(&self) -> usize {
        self.active
    }

    /// Get the number of waiting callers
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn accumulated_request_time(&self) -> Duration {
        self.accumulated_request_time
    }

    pub fn had_to_wait_count(&self) -> u64 {
        self.had_to_wait_count
    }

    pub fn accumulated_wait_time(&self) -> Duration {
        self.accumulated_wait_time
    }

    pub fn accumulated_checkout_time(&self) -> Duration {
        self.accumulated_checkout_time
    }

    pub fn claimed_overdue_count(&self) -> u64 {
        self.claimed_overdue_count
    }

    pub fn accumulated_overdue_checkout_time(&self) -> Duration {
        self.accumulated_overdue_checkout_time
    }

    pub fn bad_connection_count(&self) -> u64 {
        self.bad_connection_count
    }

    /// Average time from requesting a connection to receiving it
    pub fn average_request_time(&self) -> Duration {
        average(self.accumulated_request_time, self.request_count)
    }

    /// Average time spent blocked, over checkouts that had to wait
    pub fn average_wait_time(&self) -> Duration {
        average(self.accumulated_wait_time, self.had_to_wait_count)
    }

    /// Average checkout duration per request
    pub fn average_checkout_time(&self) -> Duration {
        average(self.accumulated_checkout_time, self.request_count)
    }

    /// Average checkout duration of reclaimed connections
    pub fn average_overdue_checkout_time(&self) -> Duration {
        average(
            self.accumulated_overdue_checkout_time,
            self.claimed_overdue_count,
        )
    }

    /// Calculate pool utilization as a fraction (0.0 to 1.0)
    ///
    /// Returns 0.0 if the pool holds no connections.
    pub fn utilization(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.active as f64 / total as f64
        }
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new(0, 0, 0, &PoolCounters::default())
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===POOL STATS===")?;
        writeln!(f, " active connections          {}", self.active)?;
        writeln!(f, " idle connections            {}", self.idle)?;
        writeln!(f, " waiting callers             {}", self.waiting)?;
        writeln!(f, " requests                    {}", self.request_count)?;
        writeln!(
            f,
            " average request time        {:?}",
            self.average_request_time()
        )?;
        writeln!(f, " had to wait                 {}", self.had_to_wait_count)?;
        writeln!(
            f,
            " average wait time           {:?}",
            self.average_wait_time()
        )?;
        writeln!(
            f,
            " average checkout time       {:?}",
            self.average_checkout_time()
        )?;
        writeln!(
            f,
            " claimed overdue             {}",
            self.claimed_overdue_count
        )?;
        writeln!(
            f,
            " average overdue checkout    {:?}",
            self.average_overdue_checkout_time()
        )?;
        write!(
            f,
            " bad connections             {}",
            self.bad_connection_count
        )
    }
}

fn average(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos((total.as_nanos() / u128::from(count)) as u64)
}
