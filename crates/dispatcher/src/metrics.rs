//! Dispatcher metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters shared between the control loop and the API handles
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    /// Current number of registered topics
    registered: AtomicUsize,
    /// Conditions placed into an empty channel
    delivered_count: AtomicU64,
    /// Events dropped because the channel already held a pending value
    coalesced_count: AtomicU64,
    /// Notifications for topics nobody registered
    unroutable_count: AtomicU64,
    /// Resync broadcasts, from the source or the keepalive timer
    broadcast_count: AtomicU64,
    /// Keepalive timer firings
    keepalive_count: AtomicU64,
    /// Background probes that failed
    probe_failure_count: AtomicU64,
}

impl DispatcherMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current number of registered topics
    pub fn registered(&self) -> usize {
        self.registered.load(Ordering::Relaxed)
    }

    /// Set current number of registered topics
    pub fn set_registered(&self, count: usize) {
        self.registered.store(count, Ordering::Relaxed);
        observability::record_registered_topics(count);
    }

    /// Get delivered count
    pub fn delivered_count(&self) -> u64 {
        self.delivered_count.load(Ordering::Relaxed)
    }

    /// Increment delivered count
    pub fn inc_delivered_count(&self) {
        self.delivered_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get coalesced count
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced_count.load(Ordering::Relaxed)
    }

    /// Increment coalesced count
    pub fn inc_coalesced_count(&self) {
        self.coalesced_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get unroutable count
    pub fn unroutable_count(&self) -> u64 {
        self.unroutable_count.load(Ordering::Relaxed)
    }

    /// Increment unroutable count
    pub fn inc_unroutable_count(&self) {
        self.unroutable_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get broadcast count
    pub fn broadcast_count(&self) -> u64 {
        self.broadcast_count.load(Ordering::Relaxed)
    }

    /// Increment broadcast count
    pub fn inc_broadcast_count(&self) {
        self.broadcast_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get keepalive count
    pub fn keepalive_count(&self) -> u64 {
        self.keepalive_count.load(Ordering::Relaxed)
    }

    /// Increment keepalive count
    pub fn inc_keepalive_count(&self) {
        self.keepalive_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get probe failure count
    pub fn probe_failure_count(&self) -> u64 {
        self.probe_failure_count.load(Ordering::Relaxed)
    }

    /// Increment probe failure count
    pub fn inc_probe_failure_count(&self) {
        self.probe_failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            registered: self.registered(),
            delivered_count: self.delivered_count(),
            coalesced_count: self.coalesced_count(),
            unroutable_count: self.unroutable_count(),
            broadcast_count: self.broadcast_count(),
            keepalive_count: self.keepalive_count(),
            probe_failure_count: self.probe_failure_count(),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub registered: usize,
    pub delivered_count: u64,
    pub coalesced_count: u64,
    pub unroutable_count: u64,
    pub broadcast_count: u64,
    pub keepalive_count: u64,
    pub probe_failure_count: u64,
}
