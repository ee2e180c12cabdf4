use std::time::Duration;

/// One ramp step: move linearly to `target` VUs over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub const fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }

    /// Builds a stage from a signed, fractional number of seconds.
    ///
    /// `stage` is the 1-based position of the stage and is only used in errors.
    pub fn from_secs_f64(stage: usize, secs: f64, target: u64) -> Result<Self, ConfigError> {
        if secs.is_nan() || secs.is_infinite() {
            return Err(ConfigError::InvalidDuration { stage });
        }
        if secs < 0.0 {
            return Err(ConfigError::NegativeDuration { stage });
        }
        let duration =
            Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidDuration { stage })?;
        Ok(Self::new(duration, target))
    }
}

/// What the schedule yields once every stage has elapsed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum EndBehavior {
    /// Target drops to zero and the run drains.
    #[default]
    Stop,
    /// The last stage's target is held until the run is cancelled.
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("`stages` must contain at least one stage")]
    EmptySchedule,

    #[error("stage {stage}: duration must not be negative")]
    NegativeDuration { stage: usize },

    #[error("stage {stage}: duration is not a finite number of seconds")]
    InvalidDuration { stage: usize },

    #[error("`max_vus` must be a positive integer")]
    ZeroMaxVus,

    #[error("`tick` must be a positive duration")]
    ZeroTick,

    #[error("`iteration_timeout` must be a positive duration")]
    ZeroIterationTimeout,
}

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_ITERATION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Target at elapsed zero, before the first stage starts moving.
    pub start_vus: u64,
    pub stages: Vec<Stage>,
    pub end_behavior: EndBehavior,

    /// Hard cap on live VUs. `None` derives it from the highest target in the schedule.
    pub max_vus: Option<u64>,

    /// Control-loop period: how often the target is re-sampled and applied.
    pub tick: Duration,

    /// Pause after each iteration of a VU.
    pub think_time: Duration,

    pub iteration_timeout: Duration,

    /// Default per-request timeout; a request's own timeout wins.
    pub request_timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start_vus: 0,
            stages: Vec::new(),
            end_behavior: EndBehavior::Stop,
            max_vus: None,
            tick: DEFAULT_TICK,
            think_time: Duration::ZERO,
            iteration_timeout: DEFAULT_ITERATION_TIMEOUT,
            request_timeout: None,
        }
    }
}

impl RunConfig {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }
        if self.max_vus == Some(0) {
            return Err(ConfigError::ZeroMaxVus);
        }
        if self.tick.is_zero() {
            return Err(ConfigError::ZeroTick);
        }
        if self.iteration_timeout.is_zero() {
            return Err(ConfigError::ZeroIterationTimeout);
        }
        Ok(())
    }

    /// The configured cap, or the schedule's peak target (at least 1).
    pub fn effective_max_vus(&self) -> u64 {
        self.max_vus.unwrap_or_else(|| {
            let peak = self.stages.iter().map(|s| s.target).max().unwrap_or(0);
            peak.max(self.start_vus).max(1)
        })
    }
}
