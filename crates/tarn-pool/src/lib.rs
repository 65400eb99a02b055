//! Tarn Pool - Pooled connection management
//!
//! This crate keeps a bounded set of physical connections shared by
//! concurrent callers, reclaims leases held too long and probes idle
//! connections before handing them out again.

pub mod health;
pub mod pool;

#[cfg(test)]
mod testing;

pub use health::{PingOutcome, ping_connection, should_ping};
pub use pool::{ConnectionPool, DEFAULT_PING_QUERY, PoolConfig, PoolStats, PooledConnection};
pub use tarn_core::{
    ConnectionFactory, DataSourceSettings, IsolationLevel, PhysicalConnection, Result, TarnError,
    TypeSignature,
};
