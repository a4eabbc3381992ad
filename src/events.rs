//! Change notifications published by the registry and task store.

use crate::device::Platform;
use crate::task::{DeviceOutcome, TaskStatus};
use tokio::sync::broadcast;

/// Shared sender every component publishes on.
pub type EventSender = broadcast::Sender<RushEvent>;

/// Create an event bus with no initial subscribers.
#[must_use]
pub fn event_bus(capacity: usize) -> EventSender {
    let (tx, _rx) = broadcast::channel(capacity.max(1));
    tx
}

/// A state change observable by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RushEvent {
    TaskCreated {
        task_id: String,
    },
    TaskStatusChanged {
        task_id: String,
        status: TaskStatus,
    },
    DeviceOutcome {
        task_id: String,
        device_id: String,
        outcome: DeviceOutcome,
    },
    TaskDeleted {
        task_id: String,
    },
    DeviceConnected {
        device_id: String,
        platform: Platform,
    },
    DeviceDisconnected {
        device_id: String,
    },
}

impl RushEvent {
    /// Event name in host wire format.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskCreated { .. } => "task.created",
            Self::TaskStatusChanged { .. } => "task.status_changed",
            Self::DeviceOutcome { .. } => "task.device_outcome",
            Self::TaskDeleted { .. } => "task.deleted",
            Self::DeviceConnected { .. } => "device.connected",
            Self::DeviceDisconnected { .. } => "device.disconnected",
        }
    }

    /// Event body in host wire format.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::TaskCreated { task_id } | Self::TaskDeleted { task_id } => {
                serde_json::json!({ "task_id": task_id })
            }
            Self::TaskStatusChanged { task_id, status } => {
                serde_json::json!({ "task_id": task_id, "status": status })
            }
            Self::DeviceOutcome {
                task_id,
                device_id,
                outcome,
            } => serde_json::json!({
                "task_id": task_id,
                "device_id": device_id,
                "outcome": outcome,
            }),
            Self::DeviceConnected {
                device_id,
                platform,
            } => serde_json::json!({ "device_id": device_id, "platform": platform }),
            Self::DeviceDisconnected { device_id } => {
                serde_json::json!({ "device_id": device_id })
            }
        }
    }
}
