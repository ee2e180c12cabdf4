use std::collections::BTreeMap;

use parking_lot::Mutex;
use rampr_http::TransportErrorKind;
use rampr_metrics::{HistogramSummary, LatencyHistogram};

use crate::result::{IterationOutcome, IterationResult, SampleOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationCounts {
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
    pub timed_out: u64,
}

impl IterationCounts {
    pub fn total(&self) -> u64 {
        self.completed + self.failed + self.panicked + self.timed_out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckCounts {
    pub passed: u64,
    pub failed: u64,
}

impl CheckCounts {
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestSummary {
    pub total: u64,
    /// Transport failures plus responses with status >= 400.
    pub failed: u64,
    pub timeouts: u64,
    pub statuses: BTreeMap<u16, u64>,
    pub errors: BTreeMap<TransportErrorKind, u64>,
    pub bytes_received: u64,
    pub latency: HistogramSummary,
}

/// Owned, point-in-time view of everything recorded so far.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub vus_started_total: u64,
    pub iterations: IterationCounts,
    pub iteration_duration: HistogramSummary,
    pub checks: BTreeMap<String, CheckCounts>,
    pub requests: BTreeMap<String, RequestSummary>,
    /// Latency over all requests regardless of label.
    pub latency: HistogramSummary,
}

impl MetricsSnapshot {
    pub fn requests_total(&self) -> u64 {
        self.requests.values().map(|r| r.total).sum()
    }

    pub fn requests_failed_total(&self) -> u64 {
        self.requests.values().map(|r| r.failed).sum()
    }

    pub fn bytes_received_total(&self) -> u64 {
        self.requests.values().map(|r| r.bytes_received).sum()
    }

    pub fn checks_passed_total(&self) -> u64 {
        self.checks.values().map(|c| c.passed).sum()
    }

    pub fn checks_failed_total(&self) -> u64 {
        self.checks.values().map(|c| c.failed).sum()
    }
}

#[derive(Debug, Default)]
struct RequestAgg {
    total: u64,
    failed: u64,
    timeouts: u64,
    statuses: BTreeMap<u16, u64>,
    errors: BTreeMap<TransportErrorKind, u64>,
    bytes_received: u64,
    latency: LatencyHistogram,
}

#[derive(Debug, Default)]
struct AggregateState {
    vus_started_total: u64,
    iterations: IterationCounts,
    iteration_duration: LatencyHistogram,
    checks: BTreeMap<String, CheckCounts>,
    requests: BTreeMap<String, RequestAgg>,
    requests_total: u64,
    latency: LatencyHistogram,
}

/// Sink for iteration results from every VU.
///
/// Each `record` applies a whole result inside one critical section; the lock is never held
/// across an await point.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    state: Mutex<AggregateState>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_vu_started(&self) {
        self.state.lock().vus_started_total += 1;
    }

    pub fn record(&self, result: &IterationResult) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match result.outcome {
            IterationOutcome::Completed => state.iterations.completed += 1,
            IterationOutcome::Failed(_) => state.iterations.failed += 1,
            IterationOutcome::Panicked(_) => state.iterations.panicked += 1,
            IterationOutcome::TimedOut => state.iterations.timed_out += 1,
        }
        state.iteration_duration.record(result.duration);

        for check in &result.checks {
            let counts = state.checks.entry(check.name.clone()).or_default();
            if check.passed {
                counts.passed += 1;
            } else {
                counts.failed += 1;
            }
        }

        state.requests_total += result.requests.len() as u64;
        for sample in &result.requests {
            state.latency.record(sample.latency);

            let agg = state.requests.entry(sample.label.clone()).or_default();
            agg.total += 1;
            if sample.is_failed() {
                agg.failed += 1;
            }
            if sample.is_timeout() {
                agg.timeouts += 1;
            }
            match &sample.outcome {
                SampleOutcome::Response { status } => {
                    *agg.statuses.entry(*status).or_insert(0) += 1;
                }
                SampleOutcome::Failed { kind, .. } => {
                    *agg.errors.entry(*kind).or_insert(0) += 1;
                }
            }
            agg.bytes_received = agg.bytes_received.saturating_add(sample.bytes_received);
            agg.latency.record(sample.latency);
        }
    }

    /// Request and iteration totals, without building a snapshot.
    pub(crate) fn totals(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.requests_total, state.iterations.total())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock();

        MetricsSnapshot {
            vus_started_total: state.vus_started_total,
            iterations: state.iterations,
            iteration_duration: state.iteration_duration.summary(),
            checks: state.checks.clone(),
            requests: state
                .requests
                .iter()
                .map(|(label, agg)| {
                    (
                        label.clone(),
                        RequestSummary {
                            total: agg.total,
                            failed: agg.failed,
                            timeouts: agg.timeouts,
                            statuses: agg.statuses.clone(),
                            errors: agg.errors.clone(),
                            bytes_received: agg.bytes_received,
                            latency: agg.latency.summary(),
                        },
                    )
                })
                .collect(),
            latency: state.latency.summary(),
        }
    }
}
