use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rampr_http::{HttpRequest, HttpResponse, Transport, TransportErrorKind};
use tokio::time::Instant;

use crate::result::{CheckOutcome, RequestSample, SampleOutcome};

/// The capabilities a scripted body gets for one iteration: issue requests, record checks.
///
/// Cheap to clone; all clones record into the same iteration.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    vu_id: u64,
    iteration: u64,
    transport: Arc<dyn Transport>,
    request_timeout: Option<Duration>,
    recorder: Mutex<Recorder>,
}

#[derive(Debug, Default)]
struct Recorder {
    checks: Vec<CheckOutcome>,
    requests: Vec<RequestSample>,
    in_flight: BTreeMap<u64, InFlight>,
    next_token: u64,
}

#[derive(Debug)]
struct InFlight {
    label: String,
    started: Instant,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("vu_id", &self.inner.vu_id)
            .field("iteration", &self.inner.iteration)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        vu_id: u64,
        iteration: u64,
        transport: Arc<dyn Transport>,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                vu_id,
                iteration,
                transport,
                request_timeout,
                recorder: Mutex::new(Recorder::default()),
            }),
        }
    }

    pub fn vu_id(&self) -> u64 {
        self.inner.vu_id
    }

    /// 1-based iteration number of this VU.
    pub fn iteration(&self) -> u64 {
        self.inner.iteration
    }

    /// Issues `req` and records a sample under `label`, whatever the result.
    ///
    /// The request's own timeout wins over the session default. Errors are returned, not
    /// raised: the body decides whether a failed request ends the iteration.
    pub async fn request(
        &self,
        label: impl Into<String>,
        mut req: HttpRequest,
    ) -> rampr_http::Result<HttpResponse> {
        let label = label.into();
        if req.timeout.is_none() {
            req.timeout = self.inner.request_timeout;
        }
        let timeout = req.timeout;

        let started = Instant::now();
        let token = self.inner.recorder.lock().begin(label.clone(), started);

        let call = self.inner.transport.issue(req);
        let result = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(res) => res,
                Err(_) => Err(rampr_http::Error::Timeout(timeout)),
            },
            None => call.await,
        };

        let sample = match &result {
            Ok(res) => RequestSample {
                label,
                outcome: SampleOutcome::Response { status: res.status },
                latency: res.latency,
                bytes_received: res.bytes_received,
            },
            Err(err) => RequestSample {
                label,
                outcome: SampleOutcome::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                },
                latency: started.elapsed(),
                bytes_received: 0,
            },
        };
        self.inner.recorder.lock().finish(token, sample);

        result
    }

    /// Records a named assertion. A failed check never ends the iteration.
    pub fn check(&self, name: impl Into<String>, passed: bool) -> bool {
        self.inner.recorder.lock().checks.push(CheckOutcome {
            name: name.into(),
            passed,
        });
        passed
    }

    /// Records `pred(response)`, or a failure when no response arrived.
    pub fn check_response<F>(
        &self,
        name: impl Into<String>,
        result: &rampr_http::Result<HttpResponse>,
        pred: F,
    ) -> bool
    where
        F: FnOnce(&HttpResponse) -> bool,
    {
        let passed = result.as_ref().is_ok_and(pred);
        self.check(name, passed)
    }

    /// Converts every still-pending request into a timeout sample.
    pub(crate) fn abandon_in_flight(&self) {
        let mut recorder = self.inner.recorder.lock();
        let pending = std::mem::take(&mut recorder.in_flight);
        for (_, req) in pending {
            recorder.requests.push(RequestSample {
                label: req.label,
                outcome: SampleOutcome::Failed {
                    kind: TransportErrorKind::Timeout,
                    message: "iteration timed out while the request was in flight".to_string(),
                },
                latency: req.started.elapsed(),
                bytes_received: 0,
            });
        }
    }

    pub(crate) fn take_records(&self) -> (Vec<CheckOutcome>, Vec<RequestSample>) {
        let mut recorder = self.inner.recorder.lock();
        (
            std::mem::take(&mut recorder.checks),
            std::mem::take(&mut recorder.requests),
        )
    }
}

impl Recorder {
    fn begin(&mut self, label: String, started: Instant) -> u64 {
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        self.in_flight.insert(token, InFlight { label, started });
        token
    }

    fn finish(&mut self, token: u64, sample: RequestSample) {
        // Already written off by `abandon_in_flight`.
        if self.in_flight.remove(&token).is_some() {
            self.requests.push(sample);
        }
    }
}
