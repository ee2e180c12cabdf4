use std::time::Duration;

use hdrhistogram::Histogram;

/// Upper bound of a recordable value: 1 hour in microseconds.
const MAX_TRACKABLE_US: u64 = 3_600_000_000;

/// Point-in-time statistics of a latency distribution. All values are microseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSummary {
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

/// Microsecond-resolution duration histogram.
///
/// Not synchronized: owners wrap it in whatever lock guards the surrounding state.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    inner: Histogram<u64>,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self {
            inner: new_default_histogram(),
        }
    }
}

impl LatencyHistogram {
    pub fn record(&mut self, d: Duration) {
        let us: u64 = d.as_micros().try_into().unwrap_or(u64::MAX);
        // Clamp into range so a slow outlier saturates instead of being dropped.
        let _ = self.inner.record(us.clamp(1, MAX_TRACKABLE_US));
    }

    pub fn summary(&self) -> HistogramSummary {
        summarize_histogram(&self.inner)
    }
}

fn new_default_histogram() -> Histogram<u64> {
    match Histogram::<u64>::new_with_bounds(1, MAX_TRACKABLE_US, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

fn summarize_histogram(h: &Histogram<u64>) -> HistogramSummary {
    let count = h.len();
    let map_val = |v| v as f64;

    HistogramSummary {
        p50: (count > 0).then(|| map_val(h.value_at_quantile(0.50))),
        p75: (count > 0).then(|| map_val(h.value_at_quantile(0.75))),
        p90: (count > 0).then(|| map_val(h.value_at_quantile(0.90))),
        p95: (count > 0).then(|| map_val(h.value_at_quantile(0.95))),
        p99: (count > 0).then(|| map_val(h.value_at_quantile(0.99))),
        min: (count > 0).then(|| map_val(h.min())),
        max: (count > 0).then(|| map_val(h.max())),
        mean: (count > 0).then(|| h.mean()),
        stdev: (count > 0).then(|| h.stdev()),
        count,
    }
}
