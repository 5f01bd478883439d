//! Core sliding-window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::window::ClientWindow;
use crate::error::{FilazeroError, Result};

/// Default number of requests admitted per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 100;
/// Default length of the trailing window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Limits applied to every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSettings {
    /// Maximum requests admitted within the window
    pub max_requests: u32,
    /// Length of the trailing window
    pub window: Duration,
}

impl LimitSettings {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }
}

/// A client's quota state at the time of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    /// Requests still available in the current window
    pub remaining: u32,
    /// When the window will next admit a request
    pub reset_time: DateTime<Utc>,
    /// Whether the client is currently over the limit
    pub is_blocked: bool,
}

impl RateLimitInfo {
    /// Time left until `reset_time`, zero if it has already passed.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        (self.reset_time - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// `retry_after` in whole seconds, rounded up and at least 1, so that
    /// waiting that long always reaches `reset_time`.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let wait = self.retry_after(now);
        (wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1)
    }
}

/// Per-client sliding-window rate limiter.
///
/// Windows live in a sharded map: a client's window is only touched while
/// its shard is write-locked, so the prune-check-append sequence is atomic
/// per client and clients on other shards proceed in parallel.
pub struct RateLimiter {
    /// Admitted request timestamps indexed by client id
    windows: DashMap<String, ClientWindow>,
    settings: LimitSettings,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter driven by the system clock.
    pub fn new(settings: LimitSettings) -> Result<Self> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Create a rate limiter driven by the given clock.
    pub fn with_clock(settings: LimitSettings, clock: Arc<dyn Clock>) -> Result<Self> {
        if settings.max_requests == 0 {
            return Err(FilazeroError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if settings.window.is_zero() {
            return Err(FilazeroError::Config(
                "window must be greater than zero".to_string(),
            ));
        }
        let window = TimeDelta::from_std(settings.window).map_err(|e| {
            FilazeroError::Config(format!("window {:?} is out of range: {}", settings.window, e))
        })?;
        if clock.wall().checked_add_signed(window).is_none() {
            return Err(FilazeroError::Config(format!(
                "window {:?} is out of range",
                settings.window
            )));
        }

        Ok(Self {
            windows: DashMap::new(),
            settings,
            clock,
        })
    }

    /// Check whether a request from `client_id` may proceed.
    ///
    /// An admitted request is recorded; a rejected one is not.
    pub fn is_allowed(&self, client_id: &str) -> bool {
        let now = self.clock.instant();
        let LimitSettings {
            max_requests,
            window: span,
        } = self.settings;

        let allowed = match self.windows.get_mut(client_id) {
            Some(mut window) => window.try_admit(now, span, max_requests),
            None => {
                let mut window = self.windows.entry(client_id.to_string()).or_insert_with(|| {
                    debug!(client = client_id, "Creating new client window");
                    ClientWindow::new()
                });
                window.try_admit(now, span, max_requests)
            }
        };

        trace!(client = client_id, allowed, "Checked rate limit");

        if !allowed {
            debug!(
                client = client_id,
                limit = max_requests,
                "Rate limit exceeded"
            );
        }

        allowed
    }

    /// Report the quota state of `client_id` without recording a request.
    ///
    /// Expired timestamps are pruned; an unseen client is not tracked.
    pub fn get_rate_limit_info(&self, client_id: &str) -> RateLimitInfo {
        let now = self.clock.instant();
        let wall = self.clock.wall();
        let LimitSettings {
            max_requests,
            window: span,
        } = self.settings;

        match self.windows.get_mut(client_id) {
            Some(mut window) => {
                window.prune(now, span);
                RateLimitInfo {
                    remaining: window.remaining(max_requests),
                    reset_time: wall_after(wall, window.time_until_reset(now, span)),
                    is_blocked: window.len() >= max_requests as usize,
                }
            }
            None => RateLimitInfo {
                remaining: max_requests,
                reset_time: wall_after(wall, span),
                is_blocked: false,
            },
        }
    }

    /// Prune every client and forget those with nothing left in the window.
    ///
    /// Returns the number of client records removed.
    pub fn cleanup_old_requests(&self) -> usize {
        let now = self.clock.instant();
        let span = self.settings.window;
        let mut removed = 0;

        self.windows.retain(|_, window| {
            window.prune(now, span);
            if window.is_empty() {
                removed += 1;
                return false;
            }
            true
        });

        debug!(
            removed,
            remaining = self.windows.len(),
            "Rate limit cleanup complete"
        );
        removed
    }

    /// Number of requests recorded for `client_id`, as last pruned.
    ///
    /// Returns `None` if the client is not tracked.
    pub fn request_count(&self, client_id: &str) -> Option<usize> {
        self.windows.get(client_id).map(|w| w.len())
    }

    /// Get the number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.windows.len()
    }

    pub fn settings(&self) -> LimitSettings {
        self.settings
    }

    /// The current wall-clock time according to the limiter's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.wall()
    }

    /// Forget all clients.
    pub fn clear(&self) {
        self.windows.clear();
    }
}

/// `wall + delay`, saturating at the end of the calendar.
fn wall_after(wall: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delay| wall.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("settings", &self.settings)
            .field("clients", &self.windows.len())
            .finish()
    }
}
