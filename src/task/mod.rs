//! Tasks: records, the status state machine and the store that owns them.

pub mod state;
pub mod store;
pub mod types;

pub use store::{OutcomePatch, TaskStore};
pub use types::{AttemptState, DeviceOutcome, Task, TaskSpec, TaskStatus, parse_start_time};
