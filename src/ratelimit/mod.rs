//! Sliding-window rate limiting and its state management.

mod cleanup;
mod clock;
mod limiter;
mod window;

pub use cleanup::{CleanupTask, DEFAULT_CLEANUP_INTERVAL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{LimitSettings, RateLimitInfo, RateLimiter, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
pub use window::ClientWindow;
