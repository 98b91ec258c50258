//! Configuration loading, validation, and management for stepwise.
//!
//! Loads configuration from `~/.stepwise/config.toml` (or
//! `$STEPWISE_HOME/config.toml`). Validates all settings at startup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stepwise_core::{PermissionScope, RecoveryStrategy};

/// The root configuration structure.
///
/// Maps directly to `~/.stepwise/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub mining: MiningConfig,

    #[serde(default)]
    pub recorder: RecorderConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    /// Scheduled macros and goals
    #[serde(default)]
    pub schedules: Vec<ScheduleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Database file; defaults to `<config_dir>/stepwise.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_storage_backend() -> String {
    "sqlite".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("stepwise.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay between macro steps at speed 1.0
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Planner iterations before an autonomous session gives up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// How long a session may sit in awaiting-approval
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
}

fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_iterations() -> u32 {
    50
}
fn default_approval_timeout_secs() -> u64 {
    300
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_iterations: default_max_iterations(),
            approval_timeout_secs: default_approval_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Bound on recovery attempts per failing step
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base sleep for the backoff strategy
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Ladder order; each strategy at most once
    #[serde(default = "default_strategies")]
    pub strategies: Vec<RecoveryStrategy>,
}

fn default_max_attempts() -> u32 {
    6
}
fn default_backoff_ms() -> u64 {
    250
}
fn default_strategies() -> Vec<RecoveryStrategy> {
    RecoveryStrategy::DEFAULT_LADDER.to_vec()
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            strategies: default_strategies(),
        }
    }
}

impl RecoveryConfig {
    /// The strategies actually walked: the first `max_attempts` of the ladder.
    pub fn ladder(&self) -> Vec<RecoveryStrategy> {
        self.strategies
            .iter()
            .take(self.max_attempts as usize)
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    #[serde(default = "default_min_count")]
    pub min_count: u32,

    #[serde(default = "default_min_length")]
    pub min_length: usize,

    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Most recent history entries considered
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_min_count() -> u32 {
    3
}
fn default_min_length() -> usize {
    2
}
fn default_max_length() -> usize {
    6
}
fn default_window() -> usize {
    500
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            min_count: default_min_count(),
            min_length: default_min_length(),
            max_length: default_max_length(),
            window: default_window(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Leave actions that failed out of the recorded macro. They still go
    /// to history either way.
    #[serde(default)]
    pub skip_failed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Start the periodic runner together with the daemon
    #[serde(default)]
    pub autostart: bool,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            autostart: false,
        }
    }
}

/// Configuration for a scheduled macro or goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Unique name for this schedule
    pub name: String,

    /// One-shot due time (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,

    /// Cron expression (5-field: minute hour dom month dow)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,

    pub target: ScheduleTargetConfig,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// What a schedule runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleTargetConfig {
    Macro {
        macro_id: String,
        #[serde(default)]
        speed: Option<f64>,
        #[serde(default)]
        loops: Option<u32>,
    },
    Goal {
        goal: String,
        #[serde(default)]
        domain: Option<String>,
        #[serde(default)]
        scope: PermissionScope,
        #[serde(default)]
        visual_perception: bool,
    },
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from the default path (`<config_dir>/config.toml`).
    ///
    /// Environment overrides:
    /// - `STEPWISE_STORAGE`: storage backend
    /// - `STEPWISE_DB`: database path
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(backend) = std::env::var("STEPWISE_STORAGE") {
            config.storage.backend = backend;
        }
        if let Ok(path) = std::env::var("STEPWISE_DB") {
            config.storage.path = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        if let Ok(home) = std::env::var("STEPWISE_HOME") {
            return PathBuf::from(home);
        }
        dirs_home().join(".stepwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.storage.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "storage.backend must be \"sqlite\" or \"memory\", got \"{}\"",
                self.storage.backend
            )));
        }

        if self.engine.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_iterations must be at least 1".into(),
            ));
        }
        if self.engine.approval_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.approval_timeout_secs must be at least 1".into(),
            ));
        }

        let strategies = &self.recovery.strategies;
        if strategies.is_empty() {
            return Err(ConfigError::ValidationError(
                "recovery.strategies must not be empty".into(),
            ));
        }
        for (i, s) in strategies.iter().enumerate() {
            if strategies[i + 1..].contains(s) {
                return Err(ConfigError::ValidationError(format!(
                    "recovery strategy '{s}' listed more than once"
                )));
            }
        }
        if self.recovery.max_attempts == 0 || self.recovery.max_attempts as usize > strategies.len() {
            return Err(ConfigError::ValidationError(format!(
                "recovery.max_attempts must be between 1 and {}",
                strategies.len()
            )));
        }

        if self.mining.min_length == 0 || self.mining.max_length < self.mining.min_length {
            return Err(ConfigError::ValidationError(
                "mining lengths must satisfy 1 <= min_length <= max_length".into(),
            ));
        }
        if self.mining.min_count == 0 {
            return Err(ConfigError::ValidationError(
                "mining.min_count must be at least 1".into(),
            ));
        }

        if self.runner.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "runner.interval_secs must be at least 1".into(),
            ));
        }

        for schedule in &self.schedules {
            match (&schedule.at, &schedule.cron) {
                (Some(_), None) => {}
                (None, Some(cron)) if cron.split_whitespace().count() == 5 => {}
                (None, Some(_)) => {
                    return Err(ConfigError::ValidationError(format!(
                        "schedule '{}': cron needs 5 fields (minute hour dom month dow)",
                        schedule.name
                    )));
                }
                _ => {
                    return Err(ConfigError::ValidationError(format!(
                        "schedule '{}' needs exactly one of `at` or `cron`",
                        schedule.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            engine: EngineConfig::default(),
            recovery: RecoveryConfig::default(),
            mining: MiningConfig::default(),
            recorder: RecorderConfig::default(),
            runner: RunnerConfig::default(),
            schedules: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for stepwise_core::Error {
    fn from(e: ConfigError) -> Self {
        stepwise_core::Error::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(config.recovery.max_attempts, 6);
        assert_eq!(config.recovery.ladder().len(), 6);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.engine.base_delay_ms, config.engine.base_delay_ms);
        assert_eq!(parsed.recovery.strategies, config.recovery.strategies);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.mining.min_count, 3);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[engine]
base_delay_ms = 100

[recovery]
max_attempts = 3
"#,
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.engine.base_delay_ms, 100);
        assert_eq!(config.engine.max_iterations, 50);
        assert_eq!(
            config.recovery.ladder(),
            vec![
                RecoveryStrategy::RePerceive,
                RecoveryStrategy::AlternateLocator,
                RecoveryStrategy::ScrollIntoView
            ]
        );
    }

    #[test]
    fn unparseable_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "engine = [").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn recovery_bound_cannot_exceed_ladder() {
        let mut config = AppConfig::default();
        config.recovery.max_attempts = 7;
        assert!(config.validate().is_err());
        config.recovery.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_strategy_rejected() {
        let mut config = AppConfig::default();
        config.recovery.strategies = vec![RecoveryStrategy::Replan, RecoveryStrategy::Replan];
        config.recovery.max_attempts = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_mining_lengths_rejected() {
        let mut config = AppConfig::default();
        config.mining.min_length = 4;
        config.mining.max_length = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let mut config = AppConfig::default();
        config.storage.backend = "postgres".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn schedule_config_parsing() {
        let toml_str = r#"
[[schedules]]
name = "morning_login"
cron = "0 9 * * 1-5"
[schedules.target]
type = "macro"
macro_id = "m_login"
speed = 2.0

[[schedules]]
name = "check_inbox"
at = "2026-03-01T08:00:00Z"
[schedules.target]
type = "goal"
goal = "Archive newsletters in the inbox"
scope = "write"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.schedules.len(), 2);
        assert!(matches!(
            config.schedules[0].target,
            ScheduleTargetConfig::Macro { speed: Some(s), .. } if s == 2.0
        ));
        assert!(matches!(
            config.schedules[1].target,
            ScheduleTargetConfig::Goal { scope: PermissionScope::Write, .. }
        ));
    }

    #[test]
    fn schedule_needs_exactly_one_trigger() {
        let mut config = AppConfig::default();
        config.schedules.push(ScheduleConfig {
            name: "neither".into(),
            at: None,
            cron: None,
            target: ScheduleTargetConfig::Macro { macro_id: "m".into(), speed: None, loops: None },
            enabled: true,
        });
        assert!(config.validate().is_err());

        config.schedules[0].cron = Some("* *".into());
        assert!(config.validate().is_err());

        config.schedules[0].cron = Some("*/5 * * * *".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn recorder_keeps_failed_actions_unless_told() {
        assert!(!AppConfig::default().recorder.skip_failed);
        let config: AppConfig = toml::from_str("[recorder]\nskip_failed = true\n").unwrap();
        assert!(config.recorder.skip_failed);
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("base_delay_ms"));
        assert!(toml_str.contains("re_perceive"));
    }
}
