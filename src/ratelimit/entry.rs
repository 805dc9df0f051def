//! Fixed-window counter entry.

/// Lifecycle state of an entry relative to a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// `now <= window_end`: the window still counts requests
    Active,
    /// `now > window_end`: the window is dead and will be replaced or swept
    Expired,
}

/// A single key's counter within its current fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests counted in the current window
    count: u32,
    /// Absolute expiry of the current window, in epoch milliseconds
    window_end: u64,
}

impl RateLimitEntry {
    /// Open a new window at `now` holding one request.
    pub fn open(now: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            window_end: now.saturating_add(window_ms),
        }
    }

    /// Requests counted so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// When this window expires.
    pub fn window_end(&self) -> u64 {
        self.window_end
    }

    /// State of this window at `now`.
    pub fn state(&self, now: u64) -> WindowState {
        if now > self.window_end {
            WindowState::Expired
        } else {
            WindowState::Active
        }
    }

    /// Whether the sweep may delete this entry at `now`.
    pub fn is_collectable(&self, now: u64) -> bool {
        self.window_end < now
    }

    /// Try to count one more request against `limit`.
    ///
    /// Returns `false` without touching the count once the limit is reached.
    pub fn try_increment(&mut self, limit: u32) -> bool {
        if self.count >= limit {
            return false;
        }
        self.count += 1;
        true
    }

    /// Remaining budget under `limit`.
    pub fn remaining(&self, limit: u32) -> u32 {
        limit.saturating_sub(self.count)
    }
}
