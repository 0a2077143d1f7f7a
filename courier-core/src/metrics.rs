//! Router metrics: process-lifetime counters for observability.
//!
//! Counters are atomics so the router can record from `&self`. They are never
//! consulted for control flow.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Routing counters.
#[derive(Debug)]
pub struct RouteMetrics {
    cache_hits: AtomicU64,
    pattern_hits: AtomicU64,
    ai_hits: AtomicU64,
    passthroughs: AtomicU64,
    start_time: Instant,
}

impl RouteMetrics {
    pub fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            pattern_hits: AtomicU64::new(0),
            ai_hits: AtomicU64::new(0),
            passthroughs: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Pattern rules and the structured-command recognizer both count here.
    pub fn record_pattern_hit(&self) {
        self.pattern_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ai_hit(&self) {
        self.ai_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_passthrough(&self) {
        self.passthroughs.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.pattern_hits.store(0, Ordering::Relaxed);
        self.ai_hits.store(0, Ordering::Relaxed);
        self.passthroughs.store(0, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get a summary snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            pattern_hits: self.pattern_hits.load(Ordering::Relaxed),
            ai_hits: self.ai_hits.load(Ordering::Relaxed),
            passthroughs: self.passthroughs.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }
}

impl Default for RouteMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of the counters at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub pattern_hits: u64,
    pub ai_hits: u64,
    pub passthroughs: u64,
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    /// Total routing calls observed.
    pub fn total(&self) -> u64 {
        self.cache_hits + self.pattern_hits + self.ai_hits + self.passthroughs
    }
}
