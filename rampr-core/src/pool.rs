use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::aggregator::MetricsAggregator;
use crate::executor::IterationExecutor;
use crate::signal::Signal;
use crate::vu::{VuEvent, spawn_vu};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum VuState {
    Idle,
    Running,
    Retiring,
    Terminated,
}

struct VuSlot {
    state: VuState,
    retire: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

/// What one `apply_target` call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolChange {
    pub started: u64,
    pub retired: u64,
}

/// Slot table of the run's VUs. Owned and mutated by the control loop only.
pub(crate) struct VuPool {
    slots: BTreeMap<u64, VuSlot>,
    next_vu_id: u64,
    max_vus: u64,
    executor: Arc<IterationExecutor>,
    aggregator: Arc<MetricsAggregator>,
    events: UnboundedSender<VuEvent>,
}

impl VuPool {
    pub(crate) fn new(
        max_vus: u64,
        executor: Arc<IterationExecutor>,
        aggregator: Arc<MetricsAggregator>,
        events: UnboundedSender<VuEvent>,
    ) -> Self {
        Self {
            slots: BTreeMap::new(),
            next_vu_id: 1,
            max_vus,
            executor,
            aggregator,
            events,
        }
    }

    fn count(&self, state: VuState) -> u64 {
        self.slots.values().filter(|s| s.state == state).count() as u64
    }

    pub(crate) fn running(&self) -> u64 {
        self.count(VuState::Running)
    }

    pub(crate) fn retiring(&self) -> u64 {
        self.count(VuState::Retiring)
    }

    /// Running plus retiring.
    pub(crate) fn live(&self) -> u64 {
        self.slots.len() as u64
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn state_of(&self, vu_id: u64) -> Option<VuState> {
        self.slots.get(&vu_id).map(|s| s.state)
    }

    /// Converges the running count toward `target` (clamped to `max_vus`).
    ///
    /// Never lets live VUs exceed `max_vus`, so a pending retirement may delay a spawn until
    /// the retiring VU has finished its iteration.
    pub(crate) fn apply_target(&mut self, target: u64) -> PoolChange {
        let target = target.min(self.max_vus);
        let running = self.running();
        let mut change = PoolChange::default();

        if target > running {
            let room = self.max_vus.saturating_sub(self.live());
            for _ in 0..(target - running).min(room) {
                self.start_one();
                change.started += 1;
            }
        } else if target < running {
            let excess = (running - target) as usize;
            let newest: Vec<u64> = self
                .slots
                .iter()
                .rev()
                .filter(|(_, s)| s.state == VuState::Running)
                .take(excess)
                .map(|(id, _)| *id)
                .collect();
            for vu_id in newest {
                if let Some(slot) = self.slots.get_mut(&vu_id) {
                    slot.state = VuState::Retiring;
                    slot.retire.raise();
                    change.retired += 1;
                }
            }
        }

        if change != PoolChange::default() {
            tracing::debug!(
                target,
                started = change.started,
                retired = change.retired,
                running = self.running(),
                retiring = self.retiring(),
                "pool adjusted"
            );
        }
        change
    }

    fn start_one(&mut self) {
        let vu_id = self.next_vu_id;
        self.next_vu_id += 1;

        let mut slot = VuSlot {
            state: VuState::Idle,
            retire: Arc::new(Signal::new()),
            handle: None,
        };
        slot.handle = Some(spawn_vu(
            vu_id,
            self.executor.clone(),
            slot.retire.clone(),
            self.events.clone(),
        ));
        slot.state = VuState::Running;
        self.aggregator.record_vu_started();
        self.slots.insert(vu_id, slot);
    }

    /// Applies a VU's own termination report; returns the state it left.
    pub(crate) fn on_event(&mut self, event: &VuEvent) -> Option<VuState> {
        match event {
            VuEvent::Terminated {
                vu_id,
                iterations,
                reason,
            } => {
                let mut slot = self.slots.remove(vu_id)?;
                let previous = slot.state;
                slot.state = VuState::Terminated;
                tracing::debug!(
                    vu_id,
                    iterations,
                    reason = reason.as_ref(),
                    from = %previous,
                    "vu terminated"
                );
                Some(previous)
            }
        }
    }

    /// Signals every running VU to retire.
    pub(crate) fn retire_all(&mut self) -> PoolChange {
        self.apply_target(0)
    }
}

impl Drop for VuPool {
    fn drop(&mut self) {
        for slot in self.slots.values_mut() {
            if let Some(handle) = slot.handle.take() {
                handle.abort();
            }
        }
    }
}
