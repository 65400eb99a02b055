//! Pool bookkeeping guarded by the pool lock

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tarn_core::{DataSourceSettings, PhysicalConnection, TypeSignature};
use tokio::time::Instant;

use super::config::PoolConfig;
use super::stats::{PoolCounters, PoolStats};

/// Identity of one physical connection across all of its wrappers
///
/// Every hand-over (return to idle, reclamation, retirement) advances the
/// generation. A wrapper is valid only while its recorded generation is
/// the current one.
#[derive(Debug)]
pub(crate) struct ConnectionSlot {
    id: u64,
    generation: AtomicU64,
}

impl ConnectionSlot {
    fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            generation: AtomicU64::new(0),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn current(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// A physical connection as the pool tracks it in `idle` or `active`
pub(crate) struct PoolEntry {
    pub(crate) slot: Arc<ConnectionSlot>,
    pub(crate) generation: u64,
    pub(crate) connection: Arc<dyn PhysicalConnection>,
    pub(crate) created_at: Instant,
    pub(crate) last_used_at: Instant,
    pub(crate) checkout_at: Instant,
    pub(crate) type_signature: TypeSignature,
}

impl PoolEntry {
    pub(crate) fn fresh(
        id: u64,
        connection: Arc<dyn PhysicalConnection>,
        type_signature: TypeSignature,
    ) -> Self {
        let now = Instant::now();
        Self {
            slot: ConnectionSlot::new(id),
            generation: 0,
            connection,
            created_at: now,
            last_used_at: now,
            checkout_at: now,
            type_signature,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.slot.id()
    }

    pub(crate) fn is_current(&self) -> bool {
        self.slot.current() == self.generation
    }

    /// Issue a new entry for the same physical connection
    ///
    /// Wrappers handed out for `self` become invalid. Creation and last-use
    /// times carry over.
    pub(crate) fn rewrap(self) -> Self {
        let generation = self.slot.advance();
        Self { generation, ..self }
    }

    /// Invalidate every wrapper of this connection
    pub(crate) fn retire(&self) {
        self.slot.advance();
    }

    /// Guard that retires this connection unless disarmed
    pub(crate) fn guard(&self) -> CandidateGuard {
        CandidateGuard {
            slot: self.slot.clone(),
            connection: self.connection.clone(),
            armed: true,
        }
    }

    pub(crate) fn checkout_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.checkout_at)
    }

    pub(crate) fn time_since_last_use(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }
}

/// Covers a candidate between leaving the pool's books and being leased
///
/// If the acquiring future is dropped in that window, the connection is
/// retired so no handle keeps reporting itself valid, and closed in the
/// background when a runtime is available.
pub(crate) struct CandidateGuard {
    slot: Arc<ConnectionSlot>,
    connection: Arc<dyn PhysicalConnection>,
    armed: bool,
}

impl CandidateGuard {
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CandidateGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        self.slot.advance();
        tracing::debug!(
            connection_id = self.slot.id(),
            "acquire cancelled, discarding candidate connection"
        );
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let connection = self.connection.clone();
            handle.spawn(async move {
                let _ = connection.close().await;
            });
        }
    }
}

/// Everything the pool mutates, behind a single lock
pub(crate) struct PoolState {
    pub(crate) config: PoolConfig,
    pub(crate) settings: DataSourceSettings,
    /// Signature a returned connection must carry to be cached
    pub(crate) expected_signature: TypeSignature,
    pub(crate) idle: VecDeque<PoolEntry>,
    /// Leased connections in checkout order; the front is the oldest lease
    pub(crate) active: VecDeque<PoolEntry>,
    pub(crate) counters: PoolCounters,
}

impl PoolState {
    pub(crate) fn new(config: PoolConfig, settings: DataSourceSettings) -> Self {
        let expected_signature = settings.type_signature();
        Self {
            config,
            settings,
            expected_signature,
            idle: VecDeque::new(),
            active: VecDeque::new(),
            counters: PoolCounters::default(),
        }
    }

    pub(crate) fn take_idle(&mut self) -> Option<PoolEntry> {
        self.idle.pop_front()
    }

    pub(crate) fn can_open(&self) -> bool {
        self.active.len() < self.config.max_active()
    }

    pub(crate) fn has_idle_capacity(&self) -> bool {
        self.idle.len() < self.config.max_idle()
    }

    /// Take the oldest lease out of `active` if it has been held too long
    ///
    /// The oldest lease is approximated by position, not by scanning
    /// checkout times.
    pub(crate) fn claim_overdue(&mut self, now: Instant) -> Option<PoolEntry> {
        let checkout_time = self.active.front()?.checkout_time(now);
        if checkout_time <= self.config.max_checkout_time() {
            return None;
        }

        let entry = self.active.pop_front()?;
        self.counters.claimed_overdue_count += 1;
        self.counters.accumulated_overdue_checkout_time += checkout_time;
        self.counters.accumulated_checkout_time += checkout_time;
        Some(entry)
    }

    /// Remove the lease issued as (`id`, `generation`) from `active`
    pub(crate) fn remove_active(&mut self, id: u64, generation: u64) -> Option<PoolEntry> {
        let position = self
            .active
            .iter()
            .position(|entry| entry.id() == id && entry.generation == generation)?;
        self.active.remove(position)
    }

    /// Empty both sequences, active leases first
    pub(crate) fn drain_all(&mut self) -> Vec<PoolEntry> {
        self.active.drain(..).chain(self.idle.drain(..)).collect()
    }

    pub(crate) fn record_request(&mut self, elapsed: Duration) {
        self.counters.request_count += 1;
        self.counters.accumulated_request_time += elapsed;
    }

    pub(crate) fn record_bad_connection(&mut self) {
        self.counters.bad_connection_count += 1;
    }

    pub(crate) fn snapshot(&self, waiting: usize) -> PoolStats {
        PoolStats::new(self.idle.len(), self.active.len(), waiting, &self.counters)
    }
}
