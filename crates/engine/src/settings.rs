//! Engine tuning knobs.

use std::time::Duration;
use stepwise_config::AppConfig;
use stepwise_core::RecoveryStrategy;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Inter-step delay at speed 1.0
    pub base_delay: Duration,
    /// Autonomous iterations before a session fails with `IterationLimit`
    pub max_iterations: u32,
    /// How long an `awaiting-approval` session waits before failing
    pub approval_timeout: Duration,
    /// Recovery strategies tried in order; its length is the attempt bound
    pub ladder: Vec<RecoveryStrategy>,
    /// Base delay for `backoff_retry`, multiplied by the attempt number
    pub backoff: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_iterations: 50,
            approval_timeout: Duration::from_secs(300),
            ladder: RecoveryStrategy::DEFAULT_LADDER.to_vec(),
            backoff: Duration::from_millis(250),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.engine.base_delay_ms),
            max_iterations: config.engine.max_iterations,
            approval_timeout: Duration::from_secs(config.engine.approval_timeout_secs),
            ladder: config.recovery.ladder(),
            backoff: Duration::from_millis(config.recovery.backoff_ms),
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    pub fn with_ladder(mut self, ladder: Vec<RecoveryStrategy>) -> Self {
        self.ladder = ladder;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay between two macro steps at `speed`.
    pub fn step_delay(&self, speed: f64) -> Duration {
        Duration::try_from_secs_f64(self.base_delay.as_secs_f64() / speed).unwrap_or(Duration::MAX)
    }
}
