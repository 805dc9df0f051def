//! Core rate limiter implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::decision::Decision;
use super::entry::{RateLimitEntry, WindowState};
use super::key::RateLimitKey;
use super::presets::{PresetTable, RateLimitConfig};
use crate::error::Result;

/// A fixed-window rate limiter over a shared in-memory store.
///
/// Each instance owns its own store, so independently configured limiters can
/// coexist. The store is sharded; the read-compare-increment for a key runs
/// under that key's shard lock, which makes `check` safe to call from many
/// threads at once.
///
/// Counters are local to this process. Several instances behind a load
/// balancer each admit `max_requests` per window.
pub struct RateLimiter<C: Clock = SystemClock> {
    /// Counters indexed by composite key
    store: DashMap<RateLimitKey, RateLimitEntry>,
    /// Named limits for `check_preset`
    presets: RwLock<PresetTable>,
    /// Time source
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Create a limiter on the system clock with the built-in presets.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for RateLimiter<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a limiter on the given clock with the built-in presets.
    pub fn with_clock(clock: C) -> Self {
        Self {
            store: DashMap::new(),
            presets: RwLock::new(PresetTable::builtin()),
            clock,
        }
    }

    /// Replace the preset table at construction.
    pub fn with_presets(self, presets: PresetTable) -> Self {
        *self.presets.write() = presets;
        self
    }

    /// Swap the preset table at runtime. Existing counters are kept.
    pub fn set_presets(&self, presets: PresetTable) {
        *self.presets.write() = presets;
    }

    /// A copy of the current preset table.
    pub fn presets(&self) -> PresetTable {
        self.presets.read().clone()
    }

    /// Resolve a named preset.
    pub fn preset(&self, name: &str) -> Result<RateLimitConfig> {
        self.presets.read().get(name).cloned()
    }

    /// Current time according to this limiter's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Count a request from `identifier` and decide whether it may proceed.
    ///
    /// Once a window's budget is spent further requests are rejected without
    /// being counted, so the count stays at `max_requests` until the window
    /// ends.
    pub fn check(&self, identifier: &str, config: &RateLimitConfig) -> Decision {
        let key = RateLimitKey::new(config.key_prefix(), identifier);
        let now = self.clock.now_ms();
        let max_requests = config.max_requests();

        trace!(key = %key, now = now, "Checking rate limit");

        let decision = match self.store.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.state(now) == WindowState::Expired {
                    *entry = RateLimitEntry::open(now, config.window_ms());
                    debug!(key = %key, window_end = entry.window_end(), "Window expired, reopened");
                    admitted(entry, max_requests)
                } else if entry.try_increment(max_requests) {
                    admitted(entry, max_requests)
                } else {
                    debug!(
                        key = %key,
                        count = entry.count(),
                        limit = max_requests,
                        "Rate limit exceeded"
                    );
                    Decision {
                        limited: true,
                        remaining: 0,
                        reset_time: entry.window_end(),
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let entry = vacant.insert(RateLimitEntry::open(now, config.window_ms()));
                debug!(key = %key, window_end = entry.window_end(), "Creating new rate limit window");
                admitted(&entry, max_requests)
            }
        };

        trace!(
            key = %key,
            limited = decision.limited,
            remaining = decision.remaining,
            reset_time = decision.reset_time,
            "Rate limit decision"
        );
        decision
    }

    /// Check `identifier` against a named preset.
    pub fn check_preset(&self, identifier: &str, preset: &str) -> Result<Decision> {
        let config = self.preset(preset)?;
        Ok(self.check(identifier, &config))
    }

    /// Report what `check` would decide, without counting anything.
    pub fn status(&self, identifier: &str, config: &RateLimitConfig) -> Decision {
        let key = RateLimitKey::new(config.key_prefix(), identifier);
        let now = self.clock.now_ms();
        let max_requests = config.max_requests();

        match self.store.get(&key) {
            Some(entry) if entry.state(now) == WindowState::Active => Decision {
                limited: entry.count() >= max_requests,
                remaining: entry.remaining(max_requests),
                reset_time: entry.window_end(),
            },
            _ => Decision {
                limited: false,
                remaining: max_requests,
                reset_time: now.saturating_add(config.window_ms()),
            },
        }
    }

    /// Remove every entry whose window ended before `now`.
    ///
    /// Returns the number of entries removed. Safe to run alongside `check`.
    pub fn cleanup(&self, now: u64) -> usize {
        // Counted inside retain: concurrent inserts would skew a len() diff.
        let mut evicted = 0;
        self.store.retain(|_, entry| {
            if entry.is_collectable(now) {
                evicted += 1;
                false
            } else {
                true
            }
        });

        debug!(evicted = evicted, remaining = self.store.len(), "Swept expired windows");
        evicted
    }

    /// Run `cleanup` at the clock's current time.
    pub fn sweep(&self) -> usize {
        self.cleanup(self.clock.now_ms())
    }

    /// The current count stored under `key`, expired or not.
    pub fn count(&self, key: &RateLimitKey) -> Option<u32> {
        self.store.get(key).map(|entry| entry.count())
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

fn admitted(entry: &RateLimitEntry, max_requests: u32) -> Decision {
    Decision {
        limited: false,
        remaining: entry.remaining(max_requests),
        reset_time: entry.window_end(),
    }
}
