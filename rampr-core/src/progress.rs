use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::MetricsSnapshot;
use crate::schedule::StageSnapshot;

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based).
    pub tick: u64,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub stage: StageSnapshot,
    /// Target applied to the pool on this tick (0 while draining).
    pub target: u64,
    pub running_vus: u64,
    pub retiring_vus: u64,
    pub max_vus: u64,
    pub draining: bool,
    /// Requests/sec observed since the previous tick.
    pub rps_now: f64,
    /// Iterations/sec observed since the previous tick.
    pub iterations_per_sec_now: f64,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub elapsed: Duration,
    pub cancelled: bool,
    pub peak_running_vus: u64,
    /// Mean and max of the per-tick request rate.
    pub rps_mean: f64,
    pub rps_max: f64,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    Started {
        total_duration: Duration,
        stages: usize,
        max_vus: u64,
    },
    Progress(Box<ProgressUpdate>),
    Cancelled {
        elapsed: Duration,
    },
    /// Carries the final metrics; emitted once, after every VU has terminated.
    RunComplete(Box<RunReport>),
}

pub type EventFn = Arc<dyn Fn(&RunEvent) + Send + Sync + 'static>;
