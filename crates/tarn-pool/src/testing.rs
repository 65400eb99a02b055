//! Mock connections and factories shared by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tarn_core::{ConnectionFactory, DataSourceSettings, PhysicalConnection, Result, TarnError};

/// Mock connection recording every call the pool makes on it
pub(crate) struct MockConnection {
    pub(crate) id: usize,
    closed: AtomicBool,
    auto_commit: bool,
    fail_probe: AtomicBool,
    fail_rollback: AtomicBool,
    rollback_delay_ms: AtomicU64,
    probes: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
}

impl MockConnection {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            closed: AtomicBool::new(false),
            auto_commit: false,
            fail_probe: AtomicBool::new(false),
            fail_rollback: AtomicBool::new(false),
            rollback_delay_ms: AtomicU64::new(0),
            probes: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn auto_commit(mut self) -> Self {
        self.auto_commit = true;
        self
    }

    pub(crate) fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_probe(&self, fail: bool) {
        self.fail_probe.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_rollback(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Make every rollback take `delay` before completing
    pub(crate) fn set_rollback_delay(&self, delay: Duration) {
        self.rollback_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub(crate) fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhysicalConnection for MockConnection {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn rollback(&self) -> Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        let delay_ms = self.rollback_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.fail_rollback.load(Ordering::SeqCst) {
            return Err(TarnError::Query("rollback failed".into()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn probe(&self, query: &str) -> Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.fail_probe.load(Ordering::SeqCst) {
            return Err(TarnError::Query(format!("probe `{}` failed", query)));
        }
        Ok(())
    }
}

/// Mock factory that counts and keeps every connection it opens
pub(crate) struct MockConnectionFactory {
    opened: Mutex<Vec<Arc<MockConnection>>>,
    fail_open: AtomicBool,
    open_closed: AtomicBool,
    auto_commit: bool,
}

impl MockConnectionFactory {
    pub(crate) fn new() -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
            fail_open: AtomicBool::new(false),
            open_closed: AtomicBool::new(false),
            auto_commit: false,
        }
    }

    pub(crate) fn auto_commit() -> Self {
        Self {
            auto_commit: true,
            ..Self::new()
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.opened.lock().len()
    }

    /// Connection opened `index`-th, starting at zero
    pub(crate) fn connection(&self, index: usize) -> Arc<MockConnection> {
        self.opened.lock()[index].clone()
    }

    pub(crate) fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Hand out connections that already report themselves closed
    pub(crate) fn set_open_closed(&self, closed: bool) {
        self.open_closed.store(closed, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn open(&self, settings: &DataSourceSettings) -> Result<Arc<dyn PhysicalConnection>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TarnError::Connection(format!(
                "could not connect to {}",
                settings.url
            )));
        }

        let mut opened = self.opened.lock();
        let mut conn = MockConnection::new(opened.len());
        if self.auto_commit {
            conn = conn.auto_commit();
        }
        conn.set_closed(self.open_closed.load(Ordering::SeqCst));

        let conn = Arc::new(conn);
        opened.push(conn.clone());
        Ok(conn)
    }
}

pub(crate) fn settings() -> DataSourceSettings {
    DataSourceSettings::new("mock", "mock://localhost/app").with_credentials("app", "secret")
}
