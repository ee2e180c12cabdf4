use std::sync::Arc;

use rampr_http::Transport;
use rampr_metrics::{CounterSnapshot, RunningStats};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::aggregator::MetricsAggregator;
use crate::config::{ConfigError, RunConfig};
use crate::error::Result;
use crate::executor::{ExecutorSettings, IterationExecutor};
use crate::pool::VuPool;
use crate::progress::{EventFn, ProgressUpdate, RunEvent, RunReport};
use crate::schedule::StageSchedule;
use crate::script::Script;
use crate::signal::Signal;

/// Requests a graceful stop: no new iterations start, in-flight ones finish and are recorded.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    signal: Arc<Signal>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.signal.raise();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_raised()
    }
}

pub struct RunController {
    config: RunConfig,
    schedule: StageSchedule,
    max_vus: u64,
    aggregator: Arc<MetricsAggregator>,
    cancel: Arc<Signal>,
    on_event: Option<EventFn>,
}

impl RunController {
    pub fn new(config: RunConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let schedule =
            StageSchedule::new(config.start_vus, config.stages.clone(), config.end_behavior)?;
        let max_vus = config.effective_max_vus();

        Ok(Self {
            config,
            schedule,
            max_vus,
            aggregator: Arc::new(MetricsAggregator::new()),
            cancel: Arc::new(Signal::new()),
            on_event: None,
        })
    }

    #[must_use]
    pub fn on_event(mut self, f: EventFn) -> Self {
        self.on_event = Some(f);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            signal: self.cancel.clone(),
        }
    }

    /// Live metrics; readable at any time during or after the run.
    pub fn aggregator(&self) -> Arc<MetricsAggregator> {
        self.aggregator.clone()
    }

    pub fn schedule(&self) -> &StageSchedule {
        &self.schedule
    }

    pub fn max_vus(&self) -> u64 {
        self.max_vus
    }

    fn emit(&self, event: RunEvent) {
        if let Some(f) = &self.on_event {
            f(&event);
        }
    }

    /// Runs the control loop on its own task.
    pub fn spawn(self, script: Arc<dyn Script>, transport: Arc<dyn Transport>) -> RunHandle {
        let cancel = self.cancel_handle();
        let task = tokio::spawn(self.run(script, transport));
        RunHandle { task, cancel }
    }

    pub async fn run(self, script: Arc<dyn Script>, transport: Arc<dyn Transport>) -> RunReport {
        let executor = Arc::new(IterationExecutor::new(
            script,
            transport,
            self.aggregator.clone(),
            ExecutorSettings {
                iteration_timeout: self.config.iteration_timeout,
                request_timeout: self.config.request_timeout,
                think_time: self.config.think_time,
            },
        ));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut pool = VuPool::new(self.max_vus, executor, self.aggregator.clone(), events_tx);

        let total_duration = self.schedule.total_duration();
        tracing::info!(
            stages = self.schedule.stages().len(),
            ?total_duration,
            max_vus = self.max_vus,
            end_behavior = %self.schedule.end_behavior(),
            "run started"
        );
        self.emit(RunEvent::Started {
            total_duration,
            stages: self.schedule.stages().len(),
            max_vus: self.max_vus,
        });

        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tick: u64 = 0;
        let mut draining = false;
        let mut cancelled = false;
        let mut peak_running_vus: u64 = 0;
        let mut rps_stats = RunningStats::default();
        let mut prev: Option<(CounterSnapshot, CounterSnapshot, std::time::Duration)> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let elapsed = started.elapsed();
                    if !draining && self.schedule.is_exhausted(elapsed) {
                        draining = true;
                        tracing::info!(?elapsed, live_vus = pool.live(), "schedule exhausted, draining");
                    }

                    let target = if draining { 0 } else { self.schedule.target_at(elapsed) };
                    pool.apply_target(target);
                    peak_running_vus = peak_running_vus.max(pool.running());
                    tick += 1;

                    let (requests_total, iterations_total) = self.aggregator.totals();
                    let requests = CounterSnapshot::new(requests_total);
                    let iterations = CounterSnapshot::new(iterations_total);
                    let (prev_requests, prev_iterations, dt) = match prev {
                        Some((r, i, at)) => (Some(r), Some(i), elapsed.saturating_sub(at)),
                        None => (None, None, elapsed),
                    };
                    let rps_now = requests.per_sec_since(prev_requests, dt.as_secs_f64());
                    if prev.is_some() {
                        rps_stats.push(rps_now);
                    }
                    prev = Some((requests, iterations, elapsed));

                    // The full snapshot is only built for a listener.
                    if self.on_event.is_some() {
                        let iterations_per_sec_now =
                            iterations.per_sec_since(prev_iterations, dt.as_secs_f64());
                        self.emit(RunEvent::Progress(Box::new(ProgressUpdate {
                            tick,
                            elapsed,
                            total_duration,
                            stage: self.schedule.stage_snapshot_at(elapsed),
                            target,
                            running_vus: pool.running(),
                            retiring_vus: pool.retiring(),
                            max_vus: self.max_vus,
                            draining,
                            rps_now,
                            iterations_per_sec_now,
                            metrics: self.aggregator.snapshot(),
                        })));
                    }
                }
                Some(event) = events_rx.recv() => {
                    pool.on_event(&event);
                }
                _ = self.cancel.wait(), if !cancelled => {
                    cancelled = true;
                    draining = true;
                    let elapsed = started.elapsed();
                    let change = pool.retire_all();
                    tracing::info!(?elapsed, retiring = change.retired, "run cancelled, draining");
                    self.emit(RunEvent::Cancelled { elapsed });
                }
            }

            if draining && pool.is_empty() {
                break;
            }
        }

        let report = RunReport {
            elapsed: started.elapsed(),
            cancelled,
            peak_running_vus,
            rps_mean: rps_stats.mean(),
            rps_max: rps_stats.max(),
            metrics: self.aggregator.snapshot(),
        };
        tracing::info!(
            elapsed = ?report.elapsed,
            cancelled,
            iterations = report.metrics.iterations.total(),
            requests = report.metrics.requests_total(),
            "run complete"
        );
        self.emit(RunEvent::RunComplete(Box::new(report.clone())));
        report
    }
}

/// A run executing on its own task.
pub struct RunHandle {
    task: JoinHandle<RunReport>,
    cancel: CancelHandle,
}

impl RunHandle {
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<RunReport> {
        Ok(self.task.await?)
    }
}
