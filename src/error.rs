//! Error types for the ticket rush engine.

use crate::task::TaskStatus;

/// Top-level error type for device orchestration and task control.
#[derive(Debug, thiserror::Error)]
pub enum RushError {
    /// Malformed task spec or command payload; rejected before any state change.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown task or device identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Requested status change is not allowed from the current state.
    #[error("illegal transition for task {task_id}: {from} -> {to}")]
    IllegalTransition {
        /// Task whose transition was rejected.
        task_id: String,
        /// Status the task was in.
        from: TaskStatus,
        /// Status that was requested.
        to: TaskStatus,
    },

    /// Device scan or connect failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Per-device purchase attempt failure.
    #[error("attempt failure: {0}")]
    Attempt(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Snapshot load/save error.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl RushError {
    /// Stable machine-readable tag carried in host error responses.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::Connection(_) => "connection_error",
            Self::Attempt(_) => "attempt_failure",
            Self::Config(_) => "config_error",
            Self::Persistence(_) => "persistence_error",
            Self::Io(_) => "io_error",
            Self::Channel(_) => "channel_error",
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RushError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_transition_message_names_both_states() {
        let err = RushError::IllegalTransition {
            task_id: "t1".to_owned(),
            from: TaskStatus::Success,
            to: TaskStatus::Running,
        };
        assert_eq!(
            err.to_string(),
            "illegal transition for task t1: success -> running"
        );
        assert_eq!(err.kind(), "illegal_transition");
    }

    #[test]
    fn io_errors_convert() {
        let err: RushError = std::io::Error::other("disk gone").into();
        assert_eq!(err.kind(), "io_error");
    }
}
