//! Periodic background sweep of expired windows.
//!
//! The limiter never starts timers of its own. Hosts that want eager eviction
//! spawn a [`Sweeper`], which calls [`RateLimiter::sweep`] on a fixed period
//! until it is shut down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::limiter::RateLimiter;
use crate::error::{RateLimitError, Result};

/// Sweep period used in production.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Handle to a running sweep task.
pub struct Sweeper {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Start sweeping `limiter` every `period`.
    ///
    /// Must be called from within a Tokio runtime. The first sweep happens one
    /// full period after spawning.
    pub fn spawn<C: Clock + 'static>(limiter: Arc<RateLimiter<C>>, period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(RateLimitError::Config(
                "sweep interval must be greater than zero".to_string(),
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            info!(period_ms = period.as_millis() as u64, "Sweeper started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {
                        let evicted = limiter.sweep();
                        debug!(evicted = evicted, entries = limiter.len(), "Sweep complete");
                    }
                }
            }

            info!("Sweeper stopped");
        });

        Ok(Self { shutdown_tx, task })
    }

    /// Stop sweeping and wait for the task to finish.
    pub async fn shutdown(self) {
        // The task may already have exited; nothing to signal then.
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sweeper task ended abnormally");
        }
    }

    /// Whether the sweep task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::presets::RateLimitConfig;

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let limiter = Arc::new(RateLimiter::new());
        let result = Sweeper::spawn(limiter, Duration::ZERO);
        assert!(matches!(result, Err(RateLimitError::Config(_))));
    }

    #[tokio::test]
    async fn test_sweeper_evicts_expired_windows() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(RateLimiter::with_clock(clock.clone()));
        let config = RateLimitConfig::new(100, 5).unwrap();

        limiter.check("a", &config);
        limiter.check("b", &config);
        clock.set(1_000);

        let sweeper = Sweeper::spawn(limiter.clone(), Duration::from_millis(10)).unwrap();

        let mut waited = 0;
        while !limiter.is_empty() && waited < 100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        assert!(limiter.is_empty());

        sweeper.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_keeps_active_windows() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(RateLimiter::with_clock(clock.clone()));
        let config = RateLimitConfig::new(60_000, 5).unwrap();

        limiter.check("a", &config);

        let sweeper = Sweeper::spawn(limiter.clone(), Duration::from_millis(5)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.len(), 1);

        sweeper.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let limiter = Arc::new(RateLimiter::new());
        let sweeper = Sweeper::spawn(limiter, Duration::from_secs(3600)).unwrap();
        assert!(!sweeper.is_finished());

        tokio::time::timeout(Duration::from_secs(1), sweeper.shutdown())
            .await
            .expect("sweeper should stop promptly");
    }
}
