//! Rate limiting logic and state management.

mod clock;
mod decision;
mod entry;
mod key;
mod limiter;
mod presets;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{Decision, Rejection, REJECTION_MESSAGE};
pub use entry::{RateLimitEntry, WindowState};
pub use key::RateLimitKey;
pub use limiter::RateLimiter;
pub use presets::{
    Preset, PresetTable, RateLimitConfig, RateLimitSpec, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS,
};
pub use sweeper::{Sweeper, DEFAULT_SWEEP_INTERVAL};
