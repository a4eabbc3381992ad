//! Configuration types for the ticket rush engine.

use crate::error::{Result, RushError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RushConfig {
    /// Scheduling loop settings.
    pub scheduler: SchedulerConfig,
    /// Per-device retry policy.
    pub retry: RetryConfig,
    /// Task-level aggregation policy.
    pub policy: PolicyConfig,
    /// Session bounds.
    pub limits: LimitsConfig,
    /// External purchase automation per platform.
    pub drivers: DriversConfig,
    /// Device discovery tooling.
    pub transport: TransportConfig,
    /// Host command channel sizing.
    pub host: HostConfig,
}

/// Scheduling loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between due-task checks in milliseconds.
    ///
    /// Tighter values fire closer to `start_time` at the cost of more wakeups.
    pub tick_ms: u64,
    /// Seconds before `start_time` at which devices are prepared (0 disables).
    pub prepare_lead_secs: u64,
    /// Optional JSON snapshot file for task records.
    pub state_path: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 200,
            prepare_lead_secs: 30,
            state_path: None,
        }
    }
}

/// Retry configuration for one device's attempt sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per device, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any retry delay in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor applied per retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 300,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// How device outcomes settle the task status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// The first recorded success settles the task and cancels sibling retries.
    #[default]
    FirstSuccessWins,
    /// Every device runs its sequence to completion; any success wins at the end.
    AllDevices,
}

/// Aggregation policy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Task-level success policy.
    pub success: SuccessPolicy,
}

/// Session bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest ticket quantity a task may request.
    pub max_quantity: u32,
    /// Largest number of task records held at once.
    pub max_tasks: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_quantity: 6,
            max_tasks: 64,
        }
    }
}

/// External automation command for one platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverCommandConfig {
    /// Program and leading arguments. Empty means the platform has no driver.
    pub command: Vec<String>,
}

/// Purchase driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriversConfig {
    /// Android automation command.
    pub android: DriverCommandConfig,
    /// iOS automation command.
    pub ios: DriverCommandConfig,
    /// Kill the automation process after this many seconds (0 = no guard).
    pub attempt_timeout_secs: u64,
}

impl Default for DriversConfig {
    fn default() -> Self {
        Self {
            android: DriverCommandConfig::default(),
            ios: DriverCommandConfig::default(),
            attempt_timeout_secs: 120,
        }
    }
}

/// Device discovery tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// `adb` binary name or path.
    pub adb_path: String,
    /// `idevice_id` binary name or path.
    pub idevice_id_path: String,
    /// `ideviceinfo` binary name or path.
    pub ideviceinfo_path: String,
    /// Timeout for a single discovery command in seconds.
    pub command_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            adb_path: "adb".to_owned(),
            idevice_id_path: "idevice_id".to_owned(),
            ideviceinfo_path: "ideviceinfo".to_owned(),
            command_timeout_secs: 5,
        }
    }
}

/// Host command channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Pending command capacity.
    pub request_capacity: usize,
    /// Event broadcast capacity.
    pub event_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            request_capacity: 64,
            event_capacity: 128,
        }
    }
}

impl RushConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| RushError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| RushError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_ms == 0 {
            return Err(RushError::Config("scheduler.tick_ms must be > 0".to_owned()));
        }
        if self.retry.max_attempts == 0 {
            return Err(RushError::Config("retry.max_attempts must be > 0".to_owned()));
        }
        if self.limits.max_quantity == 0 {
            return Err(RushError::Config("limits.max_quantity must be > 0".to_owned()));
        }
        Ok(())
    }

    /// Returns the default config file path: `~/.config/ticketrush/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("ticketrush").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("ticketrush")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/ticketrush-config/config.toml")
        }
    }
}
