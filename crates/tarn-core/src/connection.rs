//! Physical connection and factory traits

use crate::{DataSourceSettings, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A raw connection to the backing database
///
/// The pool never shares one physical connection between two owners, so
/// implementations only need to be safe to move between tasks.
#[async_trait]
pub trait PhysicalConnection: Send + Sync {
    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Whether the connection commits every statement on its own.
    ///
    /// Connections in auto-commit mode are never rolled back by the pool.
    fn is_auto_commit(&self) -> bool {
        false
    }

    /// Roll back any uncommitted work
    async fn rollback(&self) -> Result<()>;

    /// Close the connection permanently
    async fn close(&self) -> Result<()>;

    /// Run a lightweight query used as a liveness probe
    async fn probe(&self, query: &str) -> Result<()>;
}

/// Factory trait for opening new physical connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new connection using the given data source settings
    async fn open(&self, settings: &DataSourceSettings) -> Result<Arc<dyn PhysicalConnection>>;
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn open(&self, settings: &DataSourceSettings) -> Result<Arc<dyn PhysicalConnection>> {
        (**self).open(settings).await
    }
}
