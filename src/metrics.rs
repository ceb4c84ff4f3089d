//! Per-process connection and fan-out counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the gateway as connections move through their
/// lifecycle. The socket gauge is per-process; the rest are monotonic.
#[derive(Debug)]
pub struct RealtimeMetrics {
    /// Currently connected sockets on this process (gauge).
    sockets: AtomicU64,
    /// Total connections accepted.
    connected: AtomicU64,
    /// Total connections closed.
    disconnected: AtomicU64,
    /// Collection joins granted by the read check.
    joins: AtomicU64,
    /// Collection leaves processed.
    leaves: AtomicU64,
}

impl RealtimeMetrics {
    pub fn new() -> Self {
        Self {
            sockets: AtomicU64::new(0),
            connected: AtomicU64::new(0),
            disconnected: AtomicU64::new(0),
            joins: AtomicU64::new(0),
            leaves: AtomicU64::new(0),
        }
    }

    /// Record an accepted connection. Returns the updated gauge value.
    pub fn connection_opened(&self) -> u64 {
        self.connected.fetch_add(1, Ordering::Relaxed);
        self.sockets.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a closed connection. Returns the updated gauge value.
    ///
    /// Callers pair this with an earlier `connection_opened`, so the gauge
    /// cannot underflow.
    pub fn connection_closed(&self) -> u64 {
        self.disconnected.fetch_add(1, Ordering::Relaxed);
        self.sockets.fetch_sub(1, Ordering::Relaxed) - 1
    }

    pub fn join_granted(&self) {
        self.joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn leave_recorded(&self) {
        self.leaves.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero the live-socket gauge. Called during shutdown so scrapers do not
    /// keep seeing counts from a dead process.
    pub fn reset_sockets(&self) {
        self.sockets.store(0, Ordering::Relaxed);
    }

    /// Point-in-time view of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sockets: self.sockets.load(Ordering::Relaxed),
            connected: self.connected.load(Ordering::Relaxed),
            disconnected: self.disconnected.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            leaves: self.leaves.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time metric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sockets: u64,
    pub connected: u64,
    pub disconnected: u64,
    pub joins: u64,
    pub leaves: u64,
}
