use std::time::Duration;

use rampr_http::TransportErrorKind;

/// How one pass through the scripted body ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Completed,
    /// The body returned an error.
    Failed(String),
    Panicked(String),
    /// The body exceeded the iteration timeout and was aborted.
    TimedOut,
}

impl IterationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Every outcome except `Completed` takes the VU out of rotation.
    pub fn forces_retirement(&self) -> bool {
        !self.is_completed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    Response {
        status: u16,
    },
    Failed {
        kind: TransportErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSample {
    pub label: String,
    pub outcome: SampleOutcome,
    pub latency: Duration,
    pub bytes_received: u64,
}

impl RequestSample {
    pub fn status(&self) -> Option<u16> {
        match self.outcome {
            SampleOutcome::Response { status } => Some(status),
            SampleOutcome::Failed { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.outcome,
            SampleOutcome::Failed {
                kind: TransportErrorKind::Timeout,
                ..
            }
        )
    }

    /// Transport failures and responses with status >= 400.
    pub fn is_failed(&self) -> bool {
        match self.outcome {
            SampleOutcome::Response { status } => status >= 400,
            SampleOutcome::Failed { .. } => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationResult {
    pub vu_id: u64,
    /// 1-based, per VU.
    pub iteration: u64,
    pub outcome: IterationOutcome,
    pub duration: Duration,
    pub checks: Vec<CheckOutcome>,
    pub requests: Vec<RequestSample>,
}
