//! Fires pending tasks at their start time.

pub mod runner;
pub mod snapshot;

pub use runner::Scheduler;
pub use snapshot::{load_snapshot_from_path, save_snapshot_to_path};
