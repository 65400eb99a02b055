//! Connection pool implementation

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tarn_core::{
    ConnectionFactory, DataSourceSettings, IsolationLevel, Result, TarnError, TypeSignature,
};
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::time::Instant;

use super::config::PoolConfig;
use super::lease::PooledConnection;
use super::state::{PoolEntry, PoolState};
use super::stats::PoolStats;
use crate::health::{PingOutcome, ping_connection};

/// Credentials a checkout is stamped with
enum Login<'a> {
    /// The data source's own username and password
    DataSource,
    As { username: &'a str, password: &'a str },
}

struct Shared {
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<PoolState>,
    /// Woken whenever a connection leaves `active` or the pool is reset
    available: Notify,
    waiting: AtomicUsize,
    next_id: AtomicU64,
}

/// Counts a caller as waiting until dropped
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn new(waiting: &'a AtomicUsize) -> Self {
        waiting.fetch_add(1, Ordering::SeqCst);
        Self(waiting)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A bounded pool of database connections shared by concurrent callers
///
/// Idle connections are reused first. When none are idle and fewer than
/// `max_active` are checked out, a new connection is opened. When the pool is
/// saturated, the oldest lease is reclaimed if it has been held longer than
/// `max_checkout_time`; otherwise the caller waits in `max_wait` slices
/// until a connection is returned.
///
/// Cloning the pool is cheap; clones share the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<Shared>,
}

impl ConnectionPool {
    /// Create a new connection pool with the given settings, configuration and factory
    pub fn new<F: ConnectionFactory>(
        settings: DataSourceSettings,
        config: PoolConfig,
        factory: F,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                factory: Arc::new(factory),
                state: Mutex::new(PoolState::new(config, settings)),
                available: Notify::new(),
                waiting: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Get a connection using the data source's own credentials
    ///
    /// Waits for as long as it takes for a connection to become available.
    pub async fn get_connection(&self) -> Result<PooledConnection> {
        self.acquire(Login::DataSource, None).await
    }

    /// Get a connection stamped with the given credentials
    ///
    /// Physical connections are always opened with the data source's
    /// settings. A connection checked out under different credentials is
    /// closed rather than cached when it is returned.
    pub async fn get_connection_as(
        &self,
        username: &str,
        password: &str,
    ) -> Result<PooledConnection> {
        self.acquire(Login::As { username, password }, None).await
    }

    /// Get a connection, giving up once `timeout` has elapsed
    ///
    /// The deadline is only checked before waiting, so a connection that
    /// frees up at the last moment is still handed out.
    pub async fn get_connection_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
        self.acquire(Login::DataSource, Some(Instant::now() + timeout))
            .await
    }

    async fn acquire(&self, login: Login<'_>, deadline: Option<Instant>) -> Result<PooledConnection> {
        let started = Instant::now();
        let mut counted_wait = false;
        let mut local_bad_count = 0usize;
        let mut state = self.shared.state.lock().await;

        loop {
            let now = Instant::now();

            let (candidate, guard) = if let Some(entry) = state.take_idle() {
                tracing::debug!(connection_id = entry.id(), "checked out connection from pool");
                let guard = entry.guard();
                (entry, guard)
            } else if state.can_open() {
                let connection = self
                    .shared
                    .factory
                    .open(&state.settings)
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "failed to open connection");
                        e
                    })?;
                let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(connection_id = id, "created connection");
                let entry = PoolEntry::fresh(id, connection, state.expected_signature);
                let guard = entry.guard();
                (entry, guard)
            } else if let Some(overdue) = state.claim_overdue(now) {
                let guard = overdue.guard();
                if !overdue.connection.is_auto_commit() {
                    if let Err(e) = overdue.connection.rollback().await {
                        tracing::debug!(
                            connection_id = overdue.id(),
                            error = %e,
                            "bad connection, could not roll back"
                        );
                    }
                }
                let entry = overdue.rewrap();
                tracing::debug!(connection_id = entry.id(), "claimed overdue connection");
                (entry, guard)
            } else {
                if !counted_wait {
                    state.counters.had_to_wait_count += 1;
                    counted_wait = true;
                }

                // A zero max_wait waits until woken
                let mut wait_for = Some(state.config.max_wait()).filter(|d| !d.is_zero());
                if let Some(deadline) = deadline {
                    let remaining = deadline.saturating_duration_since(now);
                    if remaining.is_zero() {
                        return Err(TarnError::Timeout(format!(
                            "Timed out waiting for connection ({} active)",
                            state.active.len()
                        )));
                    }
                    wait_for = Some(wait_for.map_or(remaining, |w| w.min(remaining)));
                }

                tracing::debug!(
                    wait_ms = wait_for.map(|d| d.as_millis() as u64),
                    "waiting for connection"
                );
                state = self.wait_for_release(state, wait_for).await;
                continue;
            };

            match self.checkout_ready(&state.config, &candidate, now).await {
                Ok(()) => {
                    guard.disarm();
                    return Ok(self.lease(&mut state, candidate, &login, started));
                }
                Err(e) => tracing::debug!(
                    connection_id = candidate.id(),
                    error = %e,
                    "a bad connection was returned from the pool, getting another connection"
                ),
            }

            state.record_bad_connection();
            local_bad_count += 1;
            candidate.retire();
            guard.disarm();
            if !candidate.connection.is_closed() {
                let _ = candidate.connection.close().await;
            }

            if local_bad_count > state.config.bad_connection_limit() {
                tracing::debug!("could not get a good connection to the database");
                return Err(TarnError::Exhausted(
                    "Could not get a good connection to the database".into(),
                ));
            }
        }
    }

    /// Release the lock and sleep until woken or `wait_for` elapses
    ///
    /// With no `wait_for` the caller sleeps until the next wakeup.
    async fn wait_for_release<'a>(
        &'a self,
        state: MutexGuard<'a, PoolState>,
        wait_for: Option<Duration>,
    ) -> MutexGuard<'a, PoolState> {
        let notified = self.shared.available.notified();
        tokio::pin!(notified);
        // Register before unlocking so a release in between is not missed
        notified.as_mut().enable();

        let waiting = WaitingGuard::new(&self.shared.waiting);
        drop(state);

        let wait_started = Instant::now();
        match wait_for {
            Some(wait_for) => {
                let _ = tokio::time::timeout(wait_for, notified).await;
            }
            None => notified.await,
        }

        let mut state = self.shared.state.lock().await;
        drop(waiting);
        state.counters.accumulated_wait_time += wait_started.elapsed();
        state
    }

    /// Validate a candidate and roll back anything it left pending
    async fn checkout_ready(
        &self,
        config: &PoolConfig,
        candidate: &PoolEntry,
        now: Instant,
    ) -> Result<()> {
        if !candidate.is_current() {
            return Err(TarnError::Validation("connection was invalidated".into()));
        }

        match ping_connection(
            candidate.connection.as_ref(),
            candidate.time_since_last_use(now),
            config,
        )
        .await
        {
            PingOutcome::Closed => {
                return Err(TarnError::Validation("connection is closed".into()));
            }
            PingOutcome::Failed(reason) => {
                return Err(TarnError::Validation(format!("ping failed: {}", reason)));
            }
            PingOutcome::Skipped | PingOutcome::Alive(_) => {}
        }

        if !candidate.connection.is_auto_commit() {
            candidate.connection.rollback().await.map_err(|e| {
                TarnError::Validation(format!("rollback before checkout failed: {}", e))
            })?;
        }
        Ok(())
    }

    fn lease(
        &self,
        state: &mut PoolState,
        mut entry: PoolEntry,
        login: &Login<'_>,
        started: Instant,
    ) -> PooledConnection {
        let now = Instant::now();
        entry.type_signature = match login {
            Login::DataSource => state.settings.type_signature(),
            Login::As { username, password } => {
                TypeSignature::new(&state.settings.url, Some(*username), Some(*password))
            }
        };
        entry.checkout_at = now;
        entry.last_used_at = now;

        let lease = PooledConnection::new(self.clone(), &entry);
        state.active.push_back(entry);
        state.record_request(now.saturating_duration_since(started));
        lease
    }

    /// Return a connection to the pool
    ///
    /// A valid connection is rolled back and cached if there is idle
    /// capacity and it was checked out under the current configuration;
    /// otherwise it is closed. Returning a stale handle or a connection that
    /// reports itself closed only counts it as a bad connection. A failed
    /// rollback closes the connection and is reported.
    pub async fn release(&self, conn: &PooledConnection) -> Result<()> {
        if !Arc::ptr_eq(&conn.pool().shared, &self.shared) {
            return Err(TarnError::Configuration(
                "connection belongs to a different pool".into(),
            ));
        }

        let mut state = self.shared.state.lock().await;

        let entry = match state.remove_active(conn.id(), conn.generation()) {
            Some(entry) if entry.is_current() => entry,
            _ => {
                tracing::warn!(
                    connection_id = conn.id(),
                    "a bad connection attempted to return to the pool, discarding connection"
                );
                state.record_bad_connection();
                return Ok(());
            }
        };

        if entry.connection.is_closed() {
            tracing::warn!(
                connection_id = entry.id(),
                "a closed connection attempted to return to the pool, discarding connection"
            );
            state.record_bad_connection();
            entry.retire();
            drop(state);
            self.shared.available.notify_waiters();
            return Ok(());
        }

        let now = Instant::now();
        state.counters.accumulated_checkout_time += entry.checkout_time(now);

        let cache = entry.type_signature == state.expected_signature && state.has_idle_capacity();

        let rollback = if entry.connection.is_auto_commit() {
            Ok(())
        } else {
            entry.connection.rollback().await
        };

        let result = match rollback {
            Err(e) => {
                entry.retire();
                let _ = entry.connection.close().await;
                tracing::warn!(connection_id = entry.id(), error = %e, "rollback on return failed, closed connection");
                Err(TarnError::Rollback(e.to_string()))
            }
            Ok(()) if cache => {
                let mut idle = entry.rewrap();
                idle.last_used_at = now;
                tracing::debug!(connection_id = idle.id(), "returned connection to pool");
                state.idle.push_back(idle);
                Ok(())
            }
            Ok(()) => {
                entry.retire();
                if let Err(e) = entry.connection.close().await {
                    tracing::debug!(connection_id = entry.id(), error = %e, "error closing connection");
                }
                tracing::debug!(connection_id = entry.id(), "closed connection");
                Ok(())
            }
        };

        drop(state);
        self.shared.available.notify_waiters();
        result
    }

    /// Close every idle and checked-out connection
    ///
    /// Outstanding handles become invalid. Rollback and close errors are ignored.
    #[tracing::instrument(skip(self))]
    pub async fn force_close_all(&self) {
        let mut state = self.shared.state.lock().await;
        self.reset_locked(&mut state).await;
    }

    async fn reset_locked(&self, state: &mut PoolState) {
        state.expected_signature = state.settings.type_signature();

        for entry in state.drain_all() {
            entry.retire();
            if !entry.connection.is_auto_commit() {
                let _ = entry.connection.rollback().await;
            }
            let _ = entry.connection.close().await;
        }

        self.shared.available.notify_waiters();
        tracing::debug!("forcefully closed and removed all connections");
    }

    /// Replace the whole configuration and reset the pool
    #[tracing::instrument(skip(self, config))]
    pub async fn reconfigure(&self, config: PoolConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.shared.state.lock().await;
        state.config = config;
        self.reset_locked(&mut state).await;
        Ok(())
    }

    async fn update_config(&self, update: impl FnOnce(PoolConfig) -> PoolConfig) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        let config = update(state.config.clone());
        config.validate()?;
        state.config = config;
        self.reset_locked(&mut state).await;
        Ok(())
    }

    #[tracing::instrument(skip(self, update))]
    async fn update_settings(&self, update: impl FnOnce(&mut DataSourceSettings)) {
        let mut state = self.shared.state.lock().await;
        update(&mut state.settings);
        self.reset_locked(&mut state).await;
    }

    pub async fn set_max_active(&self, max_active: usize) -> Result<()> {
        self.update_config(|c| c.with_max_active(max_active)).await
    }

    pub async fn set_max_idle(&self, max_idle: usize) -> Result<()> {
        self.update_config(|c| c.with_max_idle(max_idle)).await
    }

    pub async fn set_max_checkout_time_ms(&self, timeout_ms: u64) -> Result<()> {
        self.update_config(|c| c.with_max_checkout_time_ms(timeout_ms))
            .await
    }

    pub async fn set_max_wait_ms(&self, timeout_ms: u64) -> Result<()> {
        self.update_config(|c| c.with_max_wait_ms(timeout_ms)).await
    }

    /// Change the bad-connection tolerance without resetting the pool
    pub async fn set_bad_connection_tolerance(&self, tolerance: usize) {
        let mut state = self.shared.state.lock().await;
        state.config = state.config.clone().with_bad_connection_tolerance(tolerance);
    }

    pub async fn set_ping_enabled(&self, enabled: bool) -> Result<()> {
        self.update_config(|c| c.with_ping_enabled(enabled)).await
    }

    pub async fn set_ping_query(&self, query: impl Into<String>) -> Result<()> {
        let query = query.into();
        self.update_config(|c| c.with_ping_query(query)).await
    }

    /// Set the idle time after which connections are probed; `None` never probes
    pub async fn set_ping_idle_threshold_ms(&self, threshold_ms: Option<u64>) -> Result<()> {
        self.update_config(|c| match threshold_ms {
            Some(ms) => c.with_ping_idle_threshold_ms(ms),
            None => c.without_ping_idle_threshold(),
        })
        .await
    }

    pub async fn set_driver(&self, driver: impl Into<String>) {
        let driver = driver.into();
        self.update_settings(|s| s.driver = driver).await
    }

    pub async fn set_url(&self, url: impl Into<String>) {
        let url = url.into();
        self.update_settings(|s| s.url = url).await
    }

    pub async fn set_username(&self, username: Option<String>) {
        self.update_settings(|s| s.username = username).await
    }

    pub async fn set_password(&self, password: Option<String>) {
        self.update_settings(|s| s.password = password).await
    }

    pub async fn set_default_auto_commit(&self, auto_commit: Option<bool>) {
        self.update_settings(|s| s.auto_commit = auto_commit).await
    }

    pub async fn set_default_isolation_level(&self, level: Option<IsolationLevel>) {
        self.update_settings(|s| s.isolation_level = level).await
    }

    pub async fn set_default_network_timeout_ms(&self, timeout_ms: Option<u64>) {
        self.update_settings(|s| s.network_timeout_ms = timeout_ms).await
    }

    pub async fn set_driver_properties(&self, properties: BTreeMap<String, String>) {
        self.update_settings(|s| s.properties = properties).await
    }

    /// Get a copy of the current pool configuration
    pub async fn config(&self) -> PoolConfig {
        self.shared.state.lock().await.config.clone()
    }

    /// Get a copy of the current data source settings
    pub async fn settings(&self) -> DataSourceSettings {
        self.shared.state.lock().await.settings.clone()
    }

    /// Get current pool statistics
    pub async fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock().await;
        state.snapshot(self.shared.waiting.load(Ordering::SeqCst))
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("waiting", &self.shared.waiting.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
