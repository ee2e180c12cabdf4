pub mod histogram;
pub mod stats;

pub use histogram::{HistogramSummary, LatencyHistogram};
pub use stats::{CounterSnapshot, RunningStats, per_sec};
