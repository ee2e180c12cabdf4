use std::sync::Arc;

use rampr_core::{HttpRequest, HttpResponse, Script, ScriptError, Session};
use rampr_http::BoxFuture;

/// A response assertion from the scenario file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CheckKind {
    Status(u16),
    BodyContains(String),
}

impl CheckKind {
    fn passes(&self, res: &HttpResponse) -> bool {
        match self {
            Self::Status(status) => res.status == *status,
            Self::BodyContains(needle) => res.body_utf8().is_some_and(|body| body.contains(needle)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CheckSpec {
    pub name: String,
    pub kind: CheckKind,
}

/// One request of the iteration body, with the checks run against its response.
#[derive(Debug, Clone)]
pub(crate) struct RequestStep {
    pub label: String,
    pub request: HttpRequest,
    pub checks: Vec<CheckSpec>,
}

/// Iteration body that sends every step in order.
///
/// A transport error is recorded (and fails the step's checks) but the remaining steps still
/// run, so one flaky endpoint doesn't retire the VU.
#[derive(Debug, Clone)]
pub(crate) struct DeclarativeScript {
    steps: Arc<[RequestStep]>,
}

impl DeclarativeScript {
    pub(crate) fn new(steps: Vec<RequestStep>) -> Self {
        Self {
            steps: steps.into(),
        }
    }
}

impl Script for DeclarativeScript {
    fn iteration(&self, session: Session) -> BoxFuture<'static, Result<(), ScriptError>> {
        let steps = self.steps.clone();
        Box::pin(async move {
            for step in steps.iter() {
                let result = session.request(step.label.as_str(), step.request.clone()).await;
                if let Err(err) = &result {
                    tracing::debug!(
                        vu_id = session.vu_id(),
                        label = %step.label,
                        kind = %err.kind(),
                        "request failed"
                    );
                }
                for check in &step.checks {
                    session.check_response(check.name.as_str(), &result, |res| {
                        check.kind.passes(res)
                    });
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;

    fn response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: Bytes::from_static(body.as_bytes()),
            latency: Duration::from_millis(1),
            bytes_received: body.len() as u64,
        }
    }

    #[test]
    fn status_check_is_exact() {
        assert!(CheckKind::Status(200).passes(&response(200, "")));
        assert!(!CheckKind::Status(200).passes(&response(201, "")));
    }

    #[test]
    fn body_contains_matches_substrings() {
        let res = response(200, r#"{"input":"hello","length":5}"#);
        assert!(CheckKind::BodyContains("\"length\":5".to_string()).passes(&res));
        assert!(!CheckKind::BodyContains("world".to_string()).passes(&res));
    }
}
