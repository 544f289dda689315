//! The windowed latency tracker.
//!
//! # Window set
//!
//! ```text
//!   retired (oldest → newest)               current
//! ┌────────┬────────┬────────┬────────┐   ┌────────┐
//! │ t - 4  │ t - 3  │ t - 2  │ t - 1  │   │   t    │ ← record()
//! └────────┴────────┴────────┴────────┘   └────────┘
//!      ↑ evicted by the next rotate()
//! ```
//!
//! One lock guards the set. `record` holds it for a single histogram
//! increment, `rotate` for a pointer swap, and `query` only long enough to
//! copy the current window and the list of retired ones; the merge runs
//! unlocked. Retired windows are immutable, so they are shared, not copied.
//!
//! A sample recorded while a rotation is pending lands in whichever window
//! is current when the lock is acquired, so it is never lost and never
//! counted twice.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::latency::window::Window;

/// Quantile levels reported by [`LatencyTracker::query`], in snapshot order.
pub const QUANTILES: [f64; 6] = [0.50, 0.75, 0.90, 0.95, 0.99, 0.999];

/// Latency quantiles in milliseconds over every retained window.
///
/// Serialises as `{"P50":…,"P75":…,"P90":…,"P95":…,"P99":…,"P999":…}`.
/// All fields are zero when no sample has been recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct QuantileSnapshot {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
}

impl QuantileSnapshot {
    fn from_window(window: &Window) -> Self {
        let [p50, p75, p90, p95, p99, p999] =
            QUANTILES.map(|q| micros_to_millis(window.value_at_quantile(q)));
        Self { p50, p75, p90, p95, p99, p999 }
    }

    /// Values in [`QUANTILES`] order.
    pub fn values(&self) -> [f64; 6] {
        [self.p50, self.p75, self.p90, self.p95, self.p99, self.p999]
    }
}

fn micros_to_millis(micros: u64) -> f64 {
    micros as f64 / 1_000.0
}

struct WindowSet {
    current: Window,
    retired: VecDeque<Arc<Window>>,
}

/// Windows captured by a query, merged after the set lock is released.
struct Captured {
    current: Window,
    retired: Vec<Arc<Window>>,
}

impl Captured {
    /// Merges every captured window into a fresh digest.
    ///
    /// All windows share the tracker's bounds, so merging cannot fail in
    /// practice. A window that does fail is skipped and logged rather than
    /// poisoning the whole result.
    fn merge(&self, empty: Window) -> Window {
        let mut merged = empty;
        let windows = self.retired.iter().map(Arc::as_ref).chain(std::iter::once(&self.current));
        for window in windows {
            if let Err(e) = merged.merge(window) {
                warn!(error = ?e, samples = window.len(), "skipping latency window that cannot be merged");
            }
        }
        merged
    }
}

/// Thread-safe latency distribution over a trailing, rotating time window.
///
/// Create one per process (or per [`Stats`](crate::Stats)), share it behind
/// an `Arc`, and drive [`rotate`](Self::rotate) from a
/// [`Rotator`](crate::latency::Rotator).
///
/// ```rust
/// use std::time::Duration;
/// use vigil::config::TrackerConfig;
/// use vigil::latency::LatencyTracker;
///
/// let tracker = LatencyTracker::new(TrackerConfig::default()).unwrap();
/// tracker.record(Duration::from_millis(1));
/// tracker.rotate();
/// assert_eq!(tracker.query().p50, 1.0);
/// ```
pub struct LatencyTracker {
    config: TrackerConfig,
    /// Never recorded into; source of fresh windows outside the lock.
    blank: Window,
    set: Mutex<WindowSet>,
}

impl LatencyTracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        let blank = Window::new(config.highest_trackable_micros(), config.significant_figures)?;
        let set = WindowSet {
            current: blank.empty_like(),
            retired: VecDeque::with_capacity(config.windows),
        };
        Ok(Self { config, blank, set: Mutex::new(set) })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Records the duration of one request.
    pub fn record(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.record_micros(micros);
    }

    /// Records one sample given in (fractional) milliseconds.
    ///
    /// Negative samples are clamped to zero and `NaN` is dropped; neither is
    /// reported to the caller.
    pub fn record_millis(&self, millis: f64) {
        if millis.is_nan() {
            debug!("dropping NaN latency sample");
            return;
        }
        if millis < 0.0 {
            debug!(millis, "clamping negative latency sample to zero");
        }
        // `as` saturates: +inf becomes u64::MAX and is clamped by the window.
        let micros = (millis.max(0.0) * 1_000.0).round() as u64;
        self.record_micros(micros);
    }

    fn record_micros(&self, micros: u64) {
        let clamped = self.set.lock().current.record(micros);
        if clamped {
            trace!(micros, ceiling_ms = self.config.highest_trackable_ms, "latency sample saturated");
        }
    }

    /// Starts a new current window and retires the previous one, evicting
    /// the oldest window once more than `windows` would be retained.
    pub fn rotate(&self) {
        let fresh = self.blank.empty_like();

        let mut set = self.set.lock();
        let previous = std::mem::replace(&mut set.current, fresh);
        set.retired.push_back(Arc::new(previous));
        let mut evicted = Vec::new();
        while set.retired.len() >= self.config.windows {
            evicted.extend(set.retired.pop_front());
        }
        let retained = set.retired.len() + 1;
        drop(set);

        // Evicted windows are freed here, outside the lock.
        trace!(retained, evicted = evicted.len(), "latency windows rotated");
    }

    /// Quantiles over the merge of every retained window.
    ///
    /// Leaves the tracker untouched.
    pub fn query(&self) -> QuantileSnapshot {
        let captured = self.capture();
        QuantileSnapshot::from_window(&captured.merge(self.blank.empty_like()))
    }

    fn capture(&self) -> Captured {
        let set = self.set.lock();
        Captured { current: set.current.clone(), retired: set.retired.iter().cloned().collect() }
    }

    /// Number of samples held across all retained windows.
    pub fn sample_count(&self) -> u64 {
        let set = self.set.lock();
        set.current.len() + set.retired.iter().map(|w| w.len()).sum::<u64>()
    }

    /// Retained windows, current one included; always in `1..=windows`.
    pub fn retained_windows(&self) -> usize {
        self.set.lock().retired.len() + 1
    }
}
