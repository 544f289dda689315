//! One time bucket of the tracker.

use hdrhistogram::{AdditionError, CreationError, Histogram};

/// Lowest discernible latency, in microseconds.
const LOWEST_MICROS: u64 = 1;

/// HDR histogram over one rotation period, in microseconds.
///
/// Memory is fixed by the configured range and precision, not by the number
/// of samples: with 3 significant figures and a one-hour ceiling a window is
/// roughly 200 KiB regardless of traffic.
#[derive(Clone)]
pub(crate) struct Window {
    hist: Histogram<u64>,
}

impl Window {
    pub(crate) fn new(highest_micros: u64, significant_figures: u8) -> Result<Self, CreationError> {
        let hist = Histogram::new_with_bounds(LOWEST_MICROS, highest_micros, significant_figures)?;
        Ok(Self { hist })
    }

    /// An empty window with the same range and precision as `self`.
    pub(crate) fn empty_like(&self) -> Self {
        Self { hist: Histogram::new_from(&self.hist) }
    }

    /// Records one sample, saturating at the highest trackable value.
    ///
    /// Returns `true` when the sample had to be clamped.
    pub(crate) fn record(&mut self, micros: u64) -> bool {
        let clamped = micros > self.hist.high();
        self.hist.saturating_record(micros);
        clamped
    }

    pub(crate) fn merge(&mut self, other: &Window) -> Result<(), AdditionError> {
        self.hist.add(&other.hist)
    }

    pub(crate) fn len(&self) -> u64 {
        self.hist.len()
    }

    /// Zero for an empty window.
    pub(crate) fn value_at_quantile(&self, quantile: f64) -> u64 {
        self.hist.value_at_quantile(quantile)
    }
}
