use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use rampr_http::Transport;
use tokio::time::Instant;

use crate::aggregator::MetricsAggregator;
use crate::result::{IterationOutcome, IterationResult};
use crate::script::Script;
use crate::session::Session;
use crate::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub iteration_timeout: Duration,
    pub request_timeout: Option<Duration>,
    pub think_time: Duration,
}

/// Runs single iterations of the scripted body and reports them to the aggregator.
///
/// Shared by every VU of a run.
pub struct IterationExecutor {
    script: Arc<dyn Script>,
    transport: Arc<dyn Transport>,
    aggregator: Arc<MetricsAggregator>,
    settings: ExecutorSettings,
}

impl IterationExecutor {
    pub fn new(
        script: Arc<dyn Script>,
        transport: Arc<dyn Transport>,
        aggregator: Arc<MetricsAggregator>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            script,
            transport,
            aggregator,
            settings,
        }
    }

    /// Runs iteration `iteration` of VU `vu_id`, records it, then applies think-time.
    ///
    /// Think-time is skipped once `retire` is raised.
    pub async fn run(&self, vu_id: u64, iteration: u64, retire: &Signal) -> IterationOutcome {
        let session = Session::new(
            vu_id,
            iteration,
            self.transport.clone(),
            self.settings.request_timeout,
        );

        let started = Instant::now();
        let script = self.script.clone();
        let body_session = session.clone();
        let mut body = tokio::spawn(async move { script.iteration(body_session).await });

        let outcome = match tokio::time::timeout(self.settings.iteration_timeout, &mut body).await
        {
            Ok(Ok(Ok(()))) => IterationOutcome::Completed,
            Ok(Ok(Err(err))) => IterationOutcome::Failed(err.to_string()),
            Ok(Err(join_err)) if join_err.is_panic() => {
                IterationOutcome::Panicked(panic_message(join_err.into_panic()))
            }
            Ok(Err(join_err)) => IterationOutcome::Failed(join_err.to_string()),
            Err(_) => {
                body.abort();
                let _ = body.await;
                session.abandon_in_flight();
                IterationOutcome::TimedOut
            }
        };
        let duration = started.elapsed();

        match &outcome {
            IterationOutcome::Completed => {}
            IterationOutcome::Failed(msg) => {
                tracing::debug!(vu_id, iteration, error = %msg, "iteration failed");
            }
            IterationOutcome::Panicked(msg) => {
                tracing::warn!(vu_id, iteration, panic = %msg, "iteration panicked");
            }
            IterationOutcome::TimedOut => {
                tracing::warn!(
                    vu_id,
                    iteration,
                    timeout = ?self.settings.iteration_timeout,
                    "iteration timed out"
                );
            }
        }

        let (checks, requests) = session.take_records();
        self.aggregator.record(&IterationResult {
            vu_id,
            iteration,
            outcome: outcome.clone(),
            duration,
            checks,
            requests,
        });

        if !self.settings.think_time.is_zero() && !retire.is_raised() {
            tokio::select! {
                _ = tokio::time::sleep(self.settings.think_time) => {}
                _ = retire.wait() => {}
            }
        }

        outcome
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rampr_http::{BoxFuture, HttpRequest, HttpResponse};

    use super::*;
    use crate::script::{ScriptError, script_fn};

    /// `/slow` takes ten seconds, everything else 10ms.
    struct PathTransport;

    impl Transport for PathTransport {
        fn issue(&self, req: HttpRequest) -> BoxFuture<'_, rampr_http::Result<HttpResponse>> {
            Box::pin(async move {
                let delay = if req.url.ends_with("/slow") {
                    Duration::from_secs(10)
                } else {
                    Duration::from_millis(10)
                };
                tokio::time::sleep(delay).await;
                Ok(HttpResponse {
                    status: 200,
                    headers: Vec::new(),
                    body: Bytes::new(),
                    latency: delay,
                    bytes_received: 0,
                })
            })
        }
    }

    fn executor(
        script: Arc<dyn Script>,
        settings: ExecutorSettings,
    ) -> (IterationExecutor, Arc<MetricsAggregator>) {
        let aggregator = Arc::new(MetricsAggregator::new());
        let exec =
            IterationExecutor::new(script, Arc::new(PathTransport), aggregator.clone(), settings);
        (exec, aggregator)
    }

    fn settings(request_timeout: Option<Duration>) -> ExecutorSettings {
        ExecutorSettings {
            iteration_timeout: Duration::from_secs(60),
            request_timeout,
            think_time: Duration::ZERO,
        }
    }

    fn two_requests_two_checks() -> Arc<dyn Script> {
        Arc::new(script_fn(|s: Session| async move {
            let first = s.request("fast", HttpRequest::get("http://t/fast")).await;
            s.check_response("fast is 200", &first, |r| r.status == 200);
            let second = s.request("slow", HttpRequest::get("http://t/slow")).await;
            s.check_response("slow is 200", &second, |r| r.status == 200);
            Ok(())
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn request_timeout_is_recorded_and_iteration_completes() {
        let (exec, agg) =
            executor(two_requests_two_checks(), settings(Some(Duration::from_secs(1))));

        let outcome = exec.run(1, 1, &Signal::new()).await;
        assert_eq!(outcome, IterationOutcome::Completed);

        let snap = agg.snapshot();
        assert_eq!(snap.requests_total(), 2);
        assert_eq!(snap.requests["fast"].statuses.get(&200), Some(&1));
        assert_eq!(snap.requests["slow"].timeouts, 1);
        assert_eq!(snap.checks["fast is 200"].passed, 1);
        assert_eq!(snap.checks["slow is 200"].failed, 1);
        assert_eq!(snap.iterations.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn iteration_timeout_aborts_body_and_keeps_partial_results() {
        let mut cfg = settings(None);
        cfg.iteration_timeout = Duration::from_secs(2);
        let (exec, agg) = executor(two_requests_two_checks(), cfg);

        let outcome = exec.run(3, 7, &Signal::new()).await;
        assert_eq!(outcome, IterationOutcome::TimedOut);

        let snap = agg.snapshot();
        assert_eq!(snap.iterations.timed_out, 1);
        assert_eq!(snap.requests["fast"].total, 1);
        assert_eq!(snap.requests["slow"].timeouts, 1);
        assert_eq!(snap.checks.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn script_error_and_panic_are_contained() {
        let failing: Arc<dyn Script> =
            Arc::new(script_fn(|_s: Session| async move { Err(ScriptError::msg("boom")) }));
        let (exec, agg) = executor(failing, settings(None));
        assert_eq!(
            exec.run(1, 1, &Signal::new()).await,
            IterationOutcome::Failed("boom".to_string())
        );
        assert_eq!(agg.snapshot().iterations.failed, 1);

        let panicking: Arc<dyn Script> = Arc::new(script_fn(|_s: Session| async move {
            if true {
                panic!("kaboom");
            }
            Ok(())
        }));
        let (exec, agg) = executor(panicking, settings(None));
        assert_eq!(
            exec.run(1, 1, &Signal::new()).await,
            IterationOutcome::Panicked("kaboom".to_string())
        );
        assert_eq!(agg.snapshot().iterations.panicked, 1);
    }

    /// Panics while building the future, before anything is awaited.
    struct EagerPanic;

    impl Script for EagerPanic {
        fn iteration(&self, _session: Session) -> BoxFuture<'static, Result<(), ScriptError>> {
            panic!("no future for you")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panic_before_the_first_poll_is_recorded() {
        let (exec, agg) = executor(Arc::new(EagerPanic), settings(None));
        assert_eq!(
            exec.run(2, 1, &Signal::new()).await,
            IterationOutcome::Panicked("no future for you".to_string())
        );

        let snap = agg.snapshot();
        assert_eq!(snap.iterations.panicked, 1);
        assert_eq!(snap.iterations.total(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn think_time_is_cut_short_by_retire() {
        let noop: Arc<dyn Script> = Arc::new(script_fn(|_s: Session| async move { Ok(()) }));
        let mut cfg = settings(None);
        cfg.think_time = Duration::from_secs(30);
        let (exec, _agg) = executor(noop, cfg);

        let retire = Arc::new(Signal::new());
        let started = Instant::now();
        let run = async {
            exec.run(1, 1, &retire).await;
        };
        let raise = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            retire.raise();
        };
        tokio::join!(run, raise);

        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }
}
