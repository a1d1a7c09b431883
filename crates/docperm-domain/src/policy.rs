//! Token lifetime policy.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Remaining lifetime below which a cached token is renewed (10 minutes).
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(600);

/// Longest lifetime a token may be issued for (5 hours).
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(18_000);

/// Decides token freshness and effective token lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    refresh_threshold: Duration,
    max_duration: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }
}

impl TokenPolicy {
    /// Creates a policy. `max_duration` is raised to `2 * refresh_threshold`
    /// if it is smaller, so a fresh token is never immediately stale.
    pub fn new(refresh_threshold: Duration, max_duration: Duration) -> Self {
        Self {
            refresh_threshold,
            max_duration: max_duration.max(refresh_threshold.saturating_mul(2)),
        }
    }

    pub fn refresh_threshold(&self) -> Duration {
        self.refresh_threshold
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Shortest lifetime a token is issued for.
    pub fn min_duration(&self) -> Duration {
        self.refresh_threshold.saturating_mul(2)
    }

    /// `max(2 * threshold, min(requested, max_duration))`.
    ///
    /// Negative requests clamp to the minimum.
    pub fn effective_duration(&self, requested_secs: i64) -> Duration {
        let requested = Duration::from_secs(requested_secs.max(0) as u64);
        requested.min(self.max_duration).max(self.min_duration())
    }

    /// True while `expires_at - now` is strictly greater than the refresh
    /// threshold.
    pub fn is_fresh(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let remaining = expires_at - now;
        match remaining.to_std() {
            Ok(remaining) => remaining > self.refresh_threshold,
            // Already expired
            Err(_) => false,
        }
    }
}
