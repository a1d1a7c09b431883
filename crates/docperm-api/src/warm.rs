//! Periodic heartbeat keeping a scale-to-zero host from idling out.
//!
//! The first tick fires one interval after start. A tick that fires more
//! than [`LATE_TOLERANCE`] after its scheduled instant is reported as late.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use docperm_server::config::WarmTimerSettings;

/// How far past its schedule a tick may fire before it counts as late.
pub const LATE_TOLERANCE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmTimer {
    period: Duration,
}

impl WarmTimer {
    /// A zero period is raised to one second.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_secs(1)),
        }
    }

    /// Returns `None` when the timer is disabled.
    pub fn from_settings(settings: &WarmTimerSettings) -> Option<Self> {
        settings
            .enabled
            .then(|| Self::new(Duration::from_secs(settings.interval_secs)))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticks until `shutdown` fires or its sender is dropped. Returns the
    /// number of heartbeats logged.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(ticks, "warm timer stopped");
                    return ticks;
                }
                scheduled = ticker.tick() => {
                    ticks += 1;
                    let late = lateness(scheduled, Instant::now());
                    let is_late = late > LATE_TOLERANCE;
                    if is_late {
                        warn!(late_ms = late.as_millis() as u64, "warm timer is running late");
                    }
                    info!(ticks, "warm timer heartbeat");
                    metrics::counter!("docperm_warm_ticks_total", "late" => is_late.to_string())
                        .increment(1);
                }
            }
        }
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<u64> {
        info!(period_secs = self.period.as_secs(), "starting warm timer");
        tokio::spawn(self.run(shutdown))
    }
}

/// How long after `scheduled` the tick was observed.
pub fn lateness(scheduled: Instant, observed: Instant) -> Duration {
    observed.saturating_duration_since(scheduled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings_respects_enabled_flag() {
        let disabled = WarmTimerSettings {
            enabled: false,
            interval_secs: 240,
        };
        assert!(WarmTimer::from_settings(&disabled).is_none());

        let enabled = WarmTimerSettings {
            enabled: true,
            interval_secs: 240,
        };
        let timer = WarmTimer::from_settings(&enabled).unwrap();
        assert_eq!(timer.period(), Duration::from_secs(240));
    }

    #[test]
    fn test_zero_period_is_raised() {
        assert_eq!(WarmTimer::new(Duration::ZERO).period(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lateness_is_measured_from_schedule() {
        let scheduled = Instant::now();
        assert_eq!(lateness(scheduled, scheduled), Duration::ZERO);
        assert_eq!(
            lateness(scheduled, scheduled + Duration::from_secs(5)),
            Duration::from_secs(5)
        );
        // Observed before the schedule saturates to zero.
        assert_eq!(
            lateness(scheduled + Duration::from_secs(5), scheduled),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period_until_shutdown() {
        let (tx, rx) = broadcast::channel(1);
        let timer = WarmTimer::new(Duration::from_secs(240));
        let handle = timer.spawn(rx);

        time::sleep(Duration::from_secs(3 * 240 + 10)).await;
        tx.send(()).unwrap();

        assert_eq!(handle.await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_before_first_period() {
        let (tx, rx) = broadcast::channel(1);
        let handle = WarmTimer::new(Duration::from_secs(240)).spawn(rx);

        time::sleep(Duration::from_secs(239)).await;
        drop(tx);

        assert_eq!(handle.await.unwrap(), 0);
    }
}
