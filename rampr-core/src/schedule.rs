use std::time::Duration;

use crate::config::{ConfigError, EndBehavior, Stage};

/// Where the schedule stands at some elapsed time; used for progress reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    /// 0-based index of the active stage (the last stage once the schedule is over).
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Piecewise-linear VU target over time.
#[derive(Debug, Clone)]
pub struct StageSchedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
    end_behavior: EndBehavior,
}

impl StageSchedule {
    pub fn new(
        start: u64,
        stages: Vec<Stage>,
        end_behavior: EndBehavior,
    ) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }

        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Ok(Self {
            start,
            stages,
            cumulative_ends,
            end_behavior,
        })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn end_behavior(&self) -> EndBehavior {
        self.end_behavior
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Highest target the schedule ever asks for.
    pub fn max_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start, u64::max)
    }

    /// True once the schedule has nothing left to run. Never true with [`EndBehavior::Hold`].
    pub fn is_exhausted(&self, elapsed: Duration) -> bool {
        self.end_behavior == EndBehavior::Stop && elapsed >= self.total_duration()
    }

    fn last_target(&self) -> u64 {
        self.stages.last().map_or(self.start, |s| s.target)
    }

    /// Index of the first stage still in progress at `elapsed`.
    ///
    /// A stage whose end equals `elapsed` is complete, so zero-length stages are jumps.
    fn active_index(&self, elapsed: Duration) -> usize {
        self.cumulative_ends.partition_point(|end| *end <= elapsed)
    }

    fn stage_start(&self, idx: usize) -> Duration {
        if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        }
    }

    fn stage_start_target(&self, idx: usize) -> u64 {
        if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        }
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let total = self.total_duration();
        if elapsed > total {
            return match self.end_behavior {
                EndBehavior::Stop => 0,
                EndBehavior::Hold => self.last_target(),
            };
        }

        let idx = self.active_index(elapsed);
        if idx >= self.stages.len() {
            return self.last_target();
        }

        let stage_start = self.stage_start(idx);
        let stage_duration = self.cumulative_ends[idx].saturating_sub(stage_start);
        let stage_elapsed = elapsed.saturating_sub(stage_start);

        let start_target = self.stage_start_target(idx);
        let end_target = self.stages[idx].target;

        if stage_duration.is_zero() {
            return end_target;
        }

        // Integer division truncates toward the stage's start value: ramp-ups round down,
        // ramp-downs round up.
        let start_i = start_target as i128;
        let delta = end_target as i128 - start_i;

        let num = stage_elapsed.as_nanos() as i128;
        let den = stage_duration.as_nanos() as i128;

        let cur = start_i + (delta.saturating_mul(num) / den.max(1));
        cur.clamp(0, u64::MAX as i128) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> StageSnapshot {
        let total = self.total_duration();
        let clamped = elapsed.min(total);

        let idx = self.active_index(clamped).min(self.stages.len() - 1);

        let stage_start = self.stage_start(idx);
        let stage_duration = self.cumulative_ends[idx].saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start).min(stage_duration);
        let stage_remaining = stage_duration.saturating_sub(stage_elapsed);

        StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining,
            start_target: self.stage_start_target(idx),
            end_target: self.stages[idx].target,
            current_target: self.target_at(elapsed),
        }
    }
}
