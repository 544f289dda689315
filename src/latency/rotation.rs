//! Periodic window rotation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::latency::LatencyTracker;

/// Background task calling [`LatencyTracker::rotate`] once per period.
///
/// The first rotation happens one full period after [`spawn`](Self::spawn).
/// Dropping the `Rotator` stops the task; the tracker keeps whatever windows
/// it holds at that moment.
pub struct Rotator {
    handle: JoinHandle<()>,
}

impl Rotator {
    /// Spawns the rotation task on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(tracker: Arc<LatencyTracker>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            // A stalled runtime must not trigger a burst of rotations that
            // would wipe every window at once.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tracker.rotate();
            }
        });
        debug!(period_secs = period.as_secs_f64(), "latency rotation started");
        Self { handle }
    }

    pub fn stop(self) {
        // Drop does the work.
    }
}

impl Drop for Rotator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;

    fn tracker(windows: usize) -> Arc<LatencyTracker> {
        Arc::new(LatencyTracker::new(TrackerConfig { windows, ..TrackerConfig::default() }).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn rotates_once_per_period() {
        let t = tracker(5);
        let _rotator = Rotator::spawn(Arc::clone(&t), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(t.retained_windows(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(t.retained_windows(), 2);

        tokio::time::sleep(Duration::from_secs(60 * 10)).await;
        assert_eq!(t.retained_windows(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn samples_age_out_after_the_trailing_window() {
        let t = tracker(2);
        let _rotator = Rotator::spawn(Arc::clone(&t), Duration::from_secs(60));

        t.record_millis(1.0);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(t.sample_count(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(t.sample_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_rotation() {
        let t = tracker(5);
        let rotator = Rotator::spawn(Arc::clone(&t), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(61)).await;
        rotator.stop();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(t.retained_windows(), 2);
    }
}
