//! Windowed latency quantiles.
//!
//! [`LatencyTracker`] keeps a ring of HDR histograms, one per rotation
//! period. Requests record into the newest ("current") histogram, a
//! [`Rotator`] retires it on a fixed clock, and queries merge every retained
//! histogram before evaluating p50 … p99.9. The result reflects roughly the
//! last `windows × rotation_period` of traffic in bounded memory.

mod rotation;
mod tracker;
mod window;

pub use rotation::Rotator;
pub use tracker::{LatencyTracker, QuantileSnapshot, QUANTILES};
