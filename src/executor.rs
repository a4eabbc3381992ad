//! Attempt fan-out for one task across its devices.
//!
//! Every device runs an independent attempt sequence. Sequences share no
//! state with each other; all results flow back through the task store,
//! which settles the task status and fires the task's cancellation token
//! once the outcome is decided. Cancellation is checked before each attempt
//! and while waiting between retries. An attempt already handed to the
//! driver always runs to completion.

use crate::config::RetryConfig;
use crate::device::DeviceRegistry;
use crate::driver::{AttemptOutcome, PurchaseDriver};
use crate::task::{DeviceOutcome, Task, TaskStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bounded retry with capped exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per device, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the `attempt`-th failed attempt.
    ///
    /// `min(base * multiplier^(attempt-1), max)` plus 0-10% jitter, never
    /// exceeding `max_delay_ms`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let max = self.max_delay_ms as f64;
        let exp = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
        let delay = (self.base_delay_ms as f64 * exp).min(max);
        let jitter = delay * (rand::random::<f64>() * 0.1);

        Duration::from_millis((delay + jitter).min(max) as u64)
    }
}

/// Runs tasks handed over by the scheduler or an explicit start.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<DeviceRegistry>,
    store: Arc<TaskStore>,
    driver: Arc<dyn PurchaseDriver>,
    retry: RetryPolicy,
}

impl Executor {
    #[must_use]
    pub fn new(
        registry: Arc<DeviceRegistry>,
        store: Arc<TaskStore>,
        driver: Arc<dyn PurchaseDriver>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            store,
            driver,
            retry,
        }
    }

    /// Start the fan-out in the background and return immediately.
    ///
    /// The task must already be `running` in the store; otherwise every
    /// device settles as cancelled without an attempt.
    pub fn run(&self, task: Task) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run_to_completion(task).await })
    }

    async fn run_to_completion(self, task: Task) {
        let task_id = task.task_id.clone();
        let cancel = match self.store.cancellation(&task_id) {
            Ok(token) => token,
            Err(e) => {
                debug!(task_id, "task vanished before execution: {e}");
                return;
            }
        };

        info!(task_id, devices = task.device_ids.len(), "executor run started");
        let task = Arc::new(task);
        let mut sequences = JoinSet::new();
        for device_id in task.device_ids.iter().cloned() {
            let this = self.clone();
            let task = Arc::clone(&task);
            let cancel = cancel.clone();
            sequences.spawn(async move { this.device_sequence(&task, &device_id, &cancel).await });
        }

        while let Some(joined) = sequences.join_next().await {
            if let Err(e) = joined {
                warn!(task_id, "device sequence aborted: {e}");
            }
        }

        // A sequence that panicked never recorded its outcome.
        if let Some(current) = self.store.get(&task_id).ok().filter(|t| !t.all_devices_settled()) {
            for (device_id, outcome) in &current.attempt_results {
                if !outcome.state.is_terminal() {
                    self.settle(
                        &task_id,
                        device_id,
                        DeviceOutcome::failed(outcome.attempts, "attempt sequence aborted"),
                    );
                }
            }
        }

        info!(task_id, "executor run finished");
    }

    async fn device_sequence(&self, task: &Task, device_id: &str, cancel: &CancellationToken) {
        let task_id = task.task_id.as_str();
        let mut last_reason = String::new();

        for attempt in 1..=self.retry.max_attempts {
            let completed = attempt - 1;
            if cancel.is_cancelled() {
                self.settle(task_id, device_id, DeviceOutcome::failed(completed, "cancelled"));
                return;
            }

            let live = self.registry.is_live(device_id).await;
            let device = match self.registry.get(device_id) {
                Some(device) if live => device,
                _ => {
                    warn!(task_id, device_id, attempt, "device unavailable");
                    self.settle(
                        task_id,
                        device_id,
                        DeviceOutcome::failed(completed, "device unavailable"),
                    );
                    return;
                }
            };

            match self.store.begin_attempt(task_id, device_id, attempt) {
                Ok(true) => {}
                Ok(false) => {
                    self.settle(task_id, device_id, DeviceOutcome::failed(completed, "cancelled"));
                    return;
                }
                Err(e) => {
                    debug!(task_id, device_id, "attempt gate closed: {e}");
                    return;
                }
            }

            match self.driver.attempt_purchase(&device, task).await {
                AttemptOutcome::Succeeded { note } => {
                    info!(task_id, device_id, attempt, "purchase attempt succeeded");
                    self.settle(task_id, device_id, DeviceOutcome::succeeded(attempt, note));
                    return;
                }
                AttemptOutcome::Failed { reason } => {
                    warn!(task_id, device_id, attempt, %reason, "purchase attempt failed");
                    last_reason = reason;
                }
            }

            if attempt == self.retry.max_attempts {
                break;
            }

            let delay = self.retry.delay_for_attempt(attempt);
            tokio::select! {
                () = cancel.cancelled() => {
                    self.settle(task_id, device_id, DeviceOutcome::failed(attempt, "cancelled"));
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.settle(
            task_id,
            device_id,
            DeviceOutcome::failed(
                self.retry.max_attempts,
                format!("attempts exhausted: {last_reason}"),
            ),
        );
    }

    fn settle(&self, task_id: &str, device_id: &str, outcome: DeviceOutcome) {
        if let Err(e) = self.store.record_outcome(task_id, device_id, outcome) {
            debug!(task_id, device_id, "device outcome dropped: {e}");
        }
    }
}
