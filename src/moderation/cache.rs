//! Judgment cache — time-bounded memo of prior AI judgments.
//!
//! Keyed by normalized (lower-cased, trimmed) message text, deliberately
//! not by community: identical text reuses one judgment everywhere. The
//! cache is a cost optimization, never a source of truth — resetting it
//! has no correctness impact.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::moderation::types::Judgment;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
/// Soft capacity: exceeding it triggers an expired-entry sweep on `put`.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Injectable time source so tests can drive TTL expiry deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct CacheEntry {
    judgment: Judgment,
    expires_at: Instant,
}

/// In-memory judgment memo with TTL and lazy capacity sweep.
///
/// Get/put are individually atomic; a benign race that causes a duplicate
/// AI call is acceptable. The entry count can transiently exceed the soft
/// capacity between sweeps.
pub struct JudgmentCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
    clock: Box<dyn Clock>,
}

impl JudgmentCache {
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_TTL, DEFAULT_CAPACITY, Box::new(SystemClock))
    }

    pub fn with_settings(ttl: Duration, capacity: usize, clock: Box<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity,
            clock,
        }
    }

    /// Canonical cache key for a message text.
    pub fn normalize(text: &str) -> String {
        text.trim().to_lowercase()
    }

    /// Look up a fresh judgment for already-normalized text.
    pub fn get(&self, normalized: &str) -> Option<Judgment> {
        let entries = self.entries.lock().expect("cache lock poisoned");
        let entry = entries.get(normalized)?;
        if entry.expires_at > self.clock.now() {
            Some(entry.judgment.clone())
        } else {
            None
        }
    }

    /// Store a judgment under already-normalized text, then sweep expired
    /// entries if the soft capacity is exceeded.
    pub fn put(&self, normalized: &str, judgment: Judgment) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            normalized.to_string(),
            CacheEntry {
                judgment,
                expires_at: now + self.ttl,
            },
        );

        if entries.len() > self.capacity {
            let before = entries.len();
            entries.retain(|_, e| e.expires_at > now);
            debug!(
                before,
                after = entries.len(),
                "Judgment cache sweep"
            );
        }
    }

    /// Number of entries currently held (fresh or not yet swept).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything. Safe at any time; the cache is never authoritative.
    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }
}

impl Default for JudgmentCache {
    fn default() -> Self {
        Self::new()
    }
}
