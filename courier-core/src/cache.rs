//! Route cache: bounded, time-expiring memo of `(message, context) → command`.
//!
//! Expired entries are dropped lazily on lookup. When the cache is full the
//! oldest *inserted* entry is evicted, which bounds memory without tracking
//! recency on every read.

use crate::config::RouteCacheConfig;
use crate::types::{RouteContext, RoutedCommand};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// A cached routing result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub command: RoutedCommand,
    pub created_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) <= ttl
    }
}

/// Lower-case, collapse runs of whitespace, and trim.
pub fn normalize_message(message: &str) -> String {
    message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Build the cache key for a message under a context.
///
/// The context discriminator is only appended when the context carries a
/// default target, so context-free messages share one key.
pub fn cache_key(message: &str, ctx: &RouteContext) -> String {
    let mut key = normalize_message(message);
    if ctx.has_targets() {
        key.push_str("||");
        let parts: Vec<String> = ctx
            .targets
            .iter()
            .map(|(kind, value)| format!("{kind}={}", value.to_lowercase()))
            .collect();
        key.push_str(&parts.join("|"));
    }
    key
}

/// Insertion-ordered TTL cache of routed commands.
///
/// Backed by an [`LruCache`] that is only ever read with `peek`, so lookups
/// never promote an entry and the least-recently *inserted* one is evicted.
#[derive(Debug)]
pub struct RouteCache {
    entries: LruCache<String, CacheEntry>,
    ttl: Duration,
}

impl RouteCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    pub fn from_config(config: &RouteCacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries)
    }

    /// Look up a fresh entry.
    pub fn get(&mut self, key: &str) -> Option<RoutedCommand> {
        self.get_at(key, Instant::now())
    }

    /// Look up a fresh entry as of `now`. Stale entries are removed.
    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<RoutedCommand> {
        let entry = self.entries.peek(key)?;
        if entry.is_fresh(now, self.ttl) {
            return Some(entry.command.clone());
        }
        self.entries.pop(key);
        None
    }

    pub fn set(&mut self, key: impl Into<String>, command: RoutedCommand) {
        self.set_at(key, command, Instant::now());
    }

    /// Insert `command` under `key`. An overwrite counts as a fresh insert;
    /// on overflow the oldest insert is evicted.
    pub fn set_at(&mut self, key: impl Into<String>, command: RoutedCommand, now: Instant) {
        self.entries.push(
            key.into(),
            CacheEntry {
                command,
                created_at: now,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::from_config(&RouteCacheConfig::default())
    }
}
