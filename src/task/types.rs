//! Task records, creation specs and per-device outcomes.

use crate::error::{Result, RushError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Stopped,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// `success`, `failed` and `stopped` never transition further.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Stopped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one device's attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
}

impl AttemptState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Per-device entry in `attempt_results`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOutcome {
    pub state: AttemptState,
    /// Purchase attempts issued so far.
    pub attempts: u32,
    /// Why the device failed, or the driver's note on success.
    pub reason: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeviceOutcome {
    #[must_use]
    pub fn not_started() -> Self {
        Self {
            state: AttemptState::NotStarted,
            attempts: 0,
            reason: None,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn in_progress(attempts: u32) -> Self {
        Self::stamped(AttemptState::InProgress, attempts, None)
    }

    #[must_use]
    pub fn succeeded(attempts: u32, note: Option<String>) -> Self {
        Self::stamped(AttemptState::Succeeded, attempts, note)
    }

    #[must_use]
    pub fn failed(attempts: u32, reason: impl Into<String>) -> Self {
        Self::stamped(AttemptState::Failed, attempts, Some(reason.into()))
    }

    fn stamped(state: AttemptState, attempts: u32, reason: Option<String>) -> Self {
        Self {
            state,
            attempts,
            reason,
            updated_at: Some(Utc::now()),
        }
    }
}

/// Caller-supplied description of a task to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Generated when absent.
    #[serde(default)]
    pub task_id: Option<String>,
    pub event_name: String,
    pub event_url: String,
    /// RFC 3339 timestamp with an explicit offset.
    pub start_time: String,
    #[serde(default)]
    pub target_price: Option<u32>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub device_ids: Vec<String>,
}

fn default_quantity() -> u32 {
    1
}

impl TaskSpec {
    /// Validate the spec and build a fresh `pending` task.
    pub fn into_task(self, max_quantity: u32) -> Result<Task> {
        let task_id = match self.task_id.as_deref().map(str::trim) {
            Some("") => {
                return Err(RushError::Validation("task_id cannot be blank".to_owned()));
            }
            Some(id) => id.to_owned(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        let event_name = self.event_name.trim();
        if event_name.is_empty() {
            return Err(RushError::Validation("event_name cannot be empty".to_owned()));
        }
        let event_url = self.event_url.trim();
        if event_url.is_empty() {
            return Err(RushError::Validation("event_url cannot be empty".to_owned()));
        }

        if !(1..=max_quantity).contains(&self.quantity) {
            return Err(RushError::Validation(format!(
                "quantity must be between 1 and {max_quantity}, got {}",
                self.quantity
            )));
        }
        if self.target_price == Some(0) {
            return Err(RushError::Validation("target_price must be positive".to_owned()));
        }

        let start_time = parse_start_time(&self.start_time)?;

        if self.device_ids.is_empty() {
            return Err(RushError::Validation(
                "device_ids must name at least one device".to_owned(),
            ));
        }
        let mut device_ids: Vec<String> = Vec::with_capacity(self.device_ids.len());
        for raw in &self.device_ids {
            let id = raw.trim();
            if id.is_empty() {
                return Err(RushError::Validation("device id cannot be blank".to_owned()));
            }
            if device_ids.iter().any(|seen| seen == id) {
                return Err(RushError::Validation(format!("duplicate device id {id}")));
            }
            device_ids.push(id.to_owned());
        }

        let attempt_results = device_ids
            .iter()
            .map(|id| (id.clone(), DeviceOutcome::not_started()))
            .collect();

        Ok(Task {
            task_id,
            event_name: event_name.to_owned(),
            event_url: event_url.to_owned(),
            start_time,
            target_price: self.target_price,
            quantity: self.quantity,
            device_ids,
            status: TaskStatus::Pending,
            attempt_results,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            prepared_at: None,
        })
    }
}

/// Parse an absolute start time. Naive timestamps are rejected.
pub fn parse_start_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            RushError::Validation(format!(
                "start_time `{raw}` is not an RFC 3339 timestamp with offset: {e}"
            ))
        })
}

/// One purchase-attempt job. Only the task store mutates these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub event_name: String,
    pub event_url: String,
    pub start_time: DateTime<Utc>,
    pub target_price: Option<u32>,
    pub quantity: u32,
    pub device_ids: Vec<String>,
    pub status: TaskStatus,
    pub attempt_results: BTreeMap<String, DeviceOutcome>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// When devices were warmed up ahead of `start_time`.
    pub prepared_at: Option<DateTime<Utc>>,
}

impl Task {
    #[must_use]
    pub fn outcome(&self, device_id: &str) -> Option<&DeviceOutcome> {
        self.attempt_results.get(device_id)
    }

    /// Returns `true` once every device's sequence has settled.
    #[must_use]
    pub fn all_devices_settled(&self) -> bool {
        self.attempt_results.values().all(|o| o.state.is_terminal())
    }
}
