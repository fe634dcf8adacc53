//! Per-agent runtime counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by an agent's workers, emitter and timer.
#[derive(Debug, Default)]
pub struct AgentStats {
    received: AtomicU64,
    emitted: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    ticks: AtomicU64,
}

impl AgentStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emitted(&self, deliveries: u64) {
        self.emitted.fetch_add(deliveries, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`AgentStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Packets taken off the inbound queue
    pub received: u64,
    /// Packet deliveries to downstream queues (one per subscriber)
    pub emitted: u64,
    /// Packets emitted on a port whose consumer had already shut down
    pub dropped: u64,
    /// Hook invocations that returned an error
    pub failed: u64,
    /// Timer firings
    pub ticks: u64,
}
