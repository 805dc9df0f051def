//! Admission decisions and the rejection body handed to HTTP layers.

use serde::{Deserialize, Serialize};

/// Message sent to clients that hit a limit.
pub const REJECTION_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// The outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether the request must be rejected
    pub limited: bool,
    /// Requests still admissible in the window
    pub remaining: u32,
    /// Absolute window expiry, in epoch milliseconds
    pub reset_time: u64,
}

impl Decision {
    /// Milliseconds from `now` until the window resets.
    pub fn reset_after_ms(&self, now: u64) -> u64 {
        self.reset_time.saturating_sub(now)
    }

    /// Build the rejection body for a limited decision.
    ///
    /// Returns `None` when the request was admitted.
    pub fn rejection(&self, now: u64) -> Option<Rejection> {
        self.limited.then(|| Rejection::new(self.reset_time, now))
    }
}

/// A "too many requests" payload, including when the client may retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    /// HTTP status the caller should respond with
    pub status: u16,
    /// Human readable message
    pub message: String,
    /// Whole seconds to wait, rounded up and never zero
    pub retry_after_secs: u64,
    /// Absolute window expiry, in epoch milliseconds
    pub reset_time: u64,
}

impl Rejection {
    /// Build a rejection for a window ending at `reset_time`.
    pub fn new(reset_time: u64, now: u64) -> Self {
        let wait_ms = reset_time.saturating_sub(now);
        Self {
            status: 429,
            message: REJECTION_MESSAGE.to_string(),
            retry_after_secs: wait_ms.div_ceil(1000).max(1),
            reset_time,
        }
    }
}
