//! Periodic eviction of idle clients.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::limiter::RateLimiter;

/// Default interval between sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Handle to the background task that sweeps expired client windows.
pub struct CleanupTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CleanupTask {
    /// Start sweeping `limiter` every `interval`.
    ///
    /// The first sweep runs one full interval after spawning. Must be called
    /// from within a tokio runtime; `interval` must be non-zero.
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately; skip that tick
            ticker.tick().await;

            info!(interval = ?interval, "Rate limit cleanup task started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.cleanup_old_requests();
                        if removed > 0 {
                            debug!(removed, "Evicted idle clients");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!("Rate limit cleanup task stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Rate limit cleanup task ended abnormally");
        }
    }

    /// Whether the task has already exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
