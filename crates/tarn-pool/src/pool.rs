//! Connection pooling for database connections
//!
//! This module provides a bounded pool with idle-connection caching,
//! reclamation of overdue leases, liveness probing and statistics.
//!
//! # Example
//!
//! ```ignore
//! use tarn_pool::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(10, 5)
//!     .with_max_checkout_time_ms(20_000)
//!     .with_ping_enabled(true)
//!     .with_ping_query("SELECT 1")
//!     .with_ping_idle_threshold_ms(60_000);
//!
//! let pool = ConnectionPool::new(settings, config, connection_factory);
//! let conn = pool.get_connection().await?;
//! conn.probe("SELECT 1").await?;
//! conn.close().await?;
//! ```

mod config;
mod lease;
#[allow(clippy::module_inception)]
mod pool;
mod state;
mod stats;


pub use config::{DEFAULT_PING_QUERY, PoolConfig};
pub use lease::PooledConnection;
pub use pool::ConnectionPool;
pub use stats::PoolStats;
