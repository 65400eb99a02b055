//! Connection ping implementation
//!
//! Runs the configured ping query against connections that have sat unused
//! for longer than the configured threshold, so a busy pool with fast
//! turnover never pays the probe cost.

use std::time::Duration;

use tarn_core::PhysicalConnection;
use tokio::time::Instant;

use crate::pool::PoolConfig;

/// Result of checking a connection before reuse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingOutcome {
    /// The connection is open and probing was not required
    Skipped,
    /// The ping query succeeded after the given round-trip time
    Alive(Duration),
    /// The connection reported itself closed
    Closed,
    /// The ping query failed; the connection has been closed
    Failed(String),
}

impl PingOutcome {
    /// Check if the connection may be handed out
    pub fn is_usable(&self) -> bool {
        matches!(self, PingOutcome::Skipped | PingOutcome::Alive(_))
    }
}

/// Whether a connection unused for `idle_for` must be probed
pub fn should_ping(config: &PoolConfig, idle_for: Duration) -> bool {
    config.ping_enabled()
        && config
            .ping_idle_threshold()
            .is_some_and(|threshold| idle_for > threshold)
}

/// Check that a connection is open and, when due, that it answers the ping query.
///
/// Never returns an error: any failure while probing marks the connection
/// unusable and closes it.
///
/// # Arguments
///
/// * `conn` - The physical connection to check
/// * `idle_for` - Time since the connection was last used
/// * `config` - Pool configuration holding the ping settings
pub async fn ping_connection(
    conn: &dyn PhysicalConnection,
    idle_for: Duration,
    config: &PoolConfig,
) -> PingOutcome {
    if conn.is_closed() {
        return PingOutcome::Closed;
    }

    if !should_ping(config, idle_for) {
        return PingOutcome::Skipped;
    }

    tracing::debug!(idle_ms = idle_for.as_millis() as u64, "testing connection");
    let start = Instant::now();

    let result = match conn.probe(config.ping_query()).await {
        Ok(()) if !conn.is_auto_commit() => conn.rollback().await,
        other => other,
    };

    match result {
        Ok(()) => PingOutcome::Alive(start.elapsed()),
        Err(e) => {
            tracing::warn!(
                query = %config.ping_query(),
                error = %e,
                "execution of ping query failed"
            );
            let _ = conn.close().await;
            PingOutcome::Failed(e.to_string())
        }
    }
}
