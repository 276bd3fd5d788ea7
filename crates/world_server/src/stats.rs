//! Dispatch statistics for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ServerError};

/// Lock-free counters updated on the dispatch path.
#[derive(Debug)]
pub struct DispatchStats {
    received: AtomicU64,
    handled: AtomicU64,
    dropped_protocol: AtomicU64,
    dropped_routing: AtomicU64,
    dropped_other: AtomicU64,
    faults: AtomicU64,
    start_time: Instant,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub received: u64,
    pub handled: u64,
    pub dropped_protocol: u64,
    pub dropped_routing: u64,
    pub dropped_other: u64,
    pub faults: u64,
}

impl StatsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dropped_protocol + self.dropped_routing + self.dropped_other
    }
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchStats {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            handled: AtomicU64::new(0),
            dropped_protocol: AtomicU64::new(0),
            dropped_routing: AtomicU64::new(0),
            dropped_other: AtomicU64::new(0),
            faults: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, error: &ServerError) {
        let counter = match error.kind() {
            ErrorKind::Protocol => &self.dropped_protocol,
            ErrorKind::Routing => &self.dropped_routing,
            _ => &self.dropped_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            received: self.received.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            dropped_protocol: self.dropped_protocol.load(Ordering::Relaxed),
            dropped_routing: self.dropped_routing.load(Ordering::Relaxed),
            dropped_other: self.dropped_other.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}
