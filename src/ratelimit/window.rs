//! Per-client sliding window of admitted request timestamps.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// The admitted requests of a single client within the trailing window.
///
/// Timestamps come from a monotonic clock and are kept oldest-first, so
/// pruning only ever pops from the front.
#[derive(Debug, Clone, Default)]
pub struct ClientWindow {
    timestamps: VecDeque<Instant>,
}

impl ClientWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every timestamp more than `window` older than `now`.
    ///
    /// Returns the number of timestamps removed.
    pub fn prune(&mut self, now: Instant, window: Duration) -> usize {
        let before = self.timestamps.len();
        while self
            .timestamps
            .front()
            .is_some_and(|oldest| now.saturating_duration_since(*oldest) > window)
        {
            self.timestamps.pop_front();
        }
        before - self.timestamps.len()
    }

    /// Prune, then record `now` if fewer than `max_requests` timestamps
    /// remain.
    ///
    /// Returns `true` if the request was admitted.
    pub fn try_admit(&mut self, now: Instant, window: Duration, max_requests: u32) -> bool {
        self.prune(now, window);

        if self.len() >= max_requests as usize {
            return false;
        }

        self.timestamps.push_back(now);
        true
    }

    /// Number of timestamps currently held.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the window holds no timestamps.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The oldest surviving timestamp, if any.
    pub fn oldest(&self) -> Option<Instant> {
        self.timestamps.front().copied()
    }

    /// Requests still available out of `max_requests`.
    pub fn remaining(&self, max_requests: u32) -> u32 {
        (max_requests as usize).saturating_sub(self.len()) as u32
    }

    /// How long from `now` until the window next frees a slot: the oldest
    /// timestamp's remaining lifetime, or the whole window if nothing is
    /// recorded.
    pub fn time_until_reset(&self, now: Instant, window: Duration) -> Duration {
        match self.oldest() {
            Some(oldest) => window.saturating_sub(now.saturating_duration_since(oldest)),
            None => window,
        }
    }
}
