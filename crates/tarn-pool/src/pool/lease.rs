//! Leased connection handle

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tarn_core::{PhysicalConnection, Result, TarnError, TypeSignature};
use tokio::time::Instant;

use super::pool::ConnectionPool;
use super::state::{ConnectionSlot, PoolEntry};

/// A connection checked out of a [`ConnectionPool`]
///
/// The handle stays usable until it is released, reclaimed as overdue, or
/// the pool is reset. After that every call that reaches the physical
/// connection fails with [`TarnError::InvalidConnection`], even if the same
/// physical connection has since been handed to someone else. The physical
/// connection is never lent out by reference, so each call is checked.
///
/// Dropping a handle does not return it; call [`PooledConnection::close`]
/// or [`ConnectionPool::release`]. A dropped lease stays checked out until
/// it becomes overdue and is reclaimed.
pub struct PooledConnection {
    pool: ConnectionPool,
    slot: Arc<ConnectionSlot>,
    generation: u64,
    connection: Arc<dyn PhysicalConnection>,
    created_at: Instant,
    last_used_at: Instant,
    checkout_at: Instant,
    type_signature: TypeSignature,
}

impl PooledConnection {
    pub(crate) fn new(pool: ConnectionPool, entry: &PoolEntry) -> Self {
        Self {
            pool,
            slot: entry.slot.clone(),
            generation: entry.generation,
            connection: entry.connection.clone(),
            created_at: entry.created_at,
            last_used_at: entry.last_used_at,
            checkout_at: entry.checkout_at,
            type_signature: entry.type_signature,
        }
    }

    /// Identifier of the underlying physical connection
    pub fn id(&self) -> u64 {
        self.slot.id()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Whether this handle still owns its physical connection
    pub fn is_valid(&self) -> bool {
        self.slot.current() == self.generation
    }

    fn checked(&self) -> Result<&dyn PhysicalConnection> {
        if self.is_valid() {
            Ok(self.connection.as_ref())
        } else {
            Err(TarnError::InvalidConnection)
        }
    }

    /// Check if the physical connection is closed
    pub fn is_closed(&self) -> Result<bool> {
        Ok(self.checked()?.is_closed())
    }

    pub fn is_auto_commit(&self) -> Result<bool> {
        Ok(self.checked()?.is_auto_commit())
    }

    /// Roll back uncommitted work on the physical connection
    pub async fn rollback(&self) -> Result<()> {
        self.checked()?.rollback().await
    }

    /// Run a lightweight query against the physical connection
    pub async fn probe(&self, query: &str) -> Result<()> {
        self.checked()?.probe(query).await
    }

    pub fn type_signature(&self) -> TypeSignature {
        self.type_signature
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub fn checkout_at(&self) -> Instant {
        self.checkout_at
    }

    /// How long this handle has been checked out
    pub fn checkout_time(&self) -> Duration {
        self.checkout_at.elapsed()
    }

    pub fn time_since_last_use(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    /// Return the connection to its pool
    pub async fn close(&self) -> Result<()> {
        self.pool.release(self).await
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id())
            .field("generation", &self.generation)
            .field("valid", &self.is_valid())
            .field("type_signature", &self.type_signature)
            .finish()
    }
}
