//! Ticketrush: scheduled, multi-device purchase-attempt orchestration.
//!
//! A task names an event, a start instant and a set of phones. At the
//! start instant the scheduler hands the task to the executor, which fans
//! purchase attempts out across every assigned device, retries transient
//! failures, and settles the task as soon as the outcome is known.
//!
//! # Architecture
//!
//! - **Device registry**: known phones and their liveness, over `adb` and
//!   libimobiledevice
//! - **Task store**: task records behind per-task locks; the only place
//!   status changes
//! - **Executor**: per-device attempt sequences with bounded retry
//! - **Scheduler**: fixed-interval loop firing due tasks
//! - **Engine**: the command/query surface, exposed to shells through the
//!   `host` JSON bridge

pub mod config;
pub mod device;
pub mod driver;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod host;
pub mod scheduler;
pub mod task;

pub use config::RushConfig;
pub use engine::{RushEngine, TestReport};
pub use error::{Result, RushError};
pub use events::RushEvent;
