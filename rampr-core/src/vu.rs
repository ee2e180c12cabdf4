use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::executor::IterationExecutor;
use crate::result::IterationOutcome;
use crate::signal::Signal;

/// Why a VU task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RetireReason {
    /// The pool asked it to stop.
    Retired,
    IterationFailed,
    IterationPanicked,
    IterationTimedOut,
    /// The task was torn down without finishing its loop.
    Aborted,
}

impl RetireReason {
    fn forced_by(outcome: &IterationOutcome) -> Option<Self> {
        match outcome {
            IterationOutcome::Completed => None,
            IterationOutcome::Failed(_) => Some(Self::IterationFailed),
            IterationOutcome::Panicked(_) => Some(Self::IterationPanicked),
            IterationOutcome::TimedOut => Some(Self::IterationTimedOut),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VuEvent {
    Terminated {
        vu_id: u64,
        iterations: u64,
        reason: RetireReason,
    },
}

/// Reports termination exactly once, on every exit path of the VU task.
struct FinishGuard {
    vu_id: u64,
    iterations: u64,
    reason: RetireReason,
    events: UnboundedSender<VuEvent>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let _ = self.events.send(VuEvent::Terminated {
            vu_id: self.vu_id,
            iterations: self.iterations,
            reason: self.reason,
        });
    }
}

pub(crate) fn spawn_vu(
    vu_id: u64,
    executor: Arc<IterationExecutor>,
    retire: Arc<Signal>,
    events: UnboundedSender<VuEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut guard = FinishGuard {
            vu_id,
            iterations: 0,
            reason: RetireReason::Aborted,
            events,
        };

        loop {
            if retire.is_raised() {
                guard.reason = RetireReason::Retired;
                break;
            }

            let iteration = guard.iterations + 1;
            let outcome = executor.run(vu_id, iteration, &retire).await;
            guard.iterations = iteration;

            if let Some(reason) = RetireReason::forced_by(&outcome) {
                guard.reason = reason;
                break;
            }
        }
    })
}
