#![forbid(unsafe_code)]

mod aggregator;
mod config;
mod controller;
mod error;
mod executor;
mod pool;
mod progress;
mod result;
mod schedule;
mod script;
mod session;
mod signal;
mod vu;

pub use aggregator::{
    CheckCounts, IterationCounts, MetricsAggregator, MetricsSnapshot, RequestSummary,
};
pub use config::{
    ConfigError, DEFAULT_ITERATION_TIMEOUT, DEFAULT_TICK, EndBehavior, RunConfig, Stage,
};
pub use controller::{CancelHandle, RunController, RunHandle};
pub use error::{Error, Result};
pub use executor::{ExecutorSettings, IterationExecutor};
pub use pool::{PoolChange, VuState};
pub use progress::{EventFn, ProgressUpdate, RunEvent, RunReport};
pub use result::{CheckOutcome, IterationOutcome, IterationResult, RequestSample, SampleOutcome};
pub use schedule::{StageSchedule, StageSnapshot};
pub use script::{FnScript, Script, ScriptError, script_fn};
pub use session::Session;
pub use signal::Signal;
pub use vu::{RetireReason, VuEvent};

pub use rampr_http::{HttpRequest, HttpResponse, Transport, TransportErrorKind};
pub use rampr_metrics::HistogramSummary;
