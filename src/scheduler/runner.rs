//! Scheduler background loop.
//!
//! A fixed-interval loop compares each pending task's absolute
//! `start_time` against the wall clock on every tick, so a task whose
//! instant passed while the process was asleep or busy fires on the next
//! check instead of being skipped. When the earliest pending start falls
//! before the next tick, the loop also wakes at that instant. The transition
//! to `running` is the only firing gate; a task that already left `pending`
//! is never fired again.

use crate::config::SchedulerConfig;
use crate::device::DeviceRegistry;
use crate::driver::PurchaseDriver;
use crate::error::{Result, RushError};
use crate::executor::Executor;
use crate::scheduler::snapshot::{load_snapshot_from_path, save_snapshot_to_path};
use crate::task::{Task, TaskStatus, TaskStore};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<TaskStore>,
    registry: Arc<DeviceRegistry>,
    executor: Executor,
    driver: Arc<dyn PurchaseDriver>,
    interval: Duration,
    /// `None` disables device preparation.
    prepare_lead: Option<chrono::Duration>,
    state_path: Option<PathBuf>,
    /// Store revision last written to `state_path`.
    saved_revision: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn new(
        store: Arc<TaskStore>,
        registry: Arc<DeviceRegistry>,
        executor: Executor,
        driver: Arc<dyn PurchaseDriver>,
    ) -> Self {
        let saved_revision = Arc::new(AtomicU64::new(store.revision()));
        Self {
            store,
            registry,
            executor,
            driver,
            interval: Duration::from_millis(200),
            prepare_lead: Some(chrono::Duration::seconds(30)),
            state_path: None,
            saved_revision,
        }
    }

    /// Apply tick interval, preparation lead and snapshot path.
    #[must_use]
    pub fn with_config(mut self, config: &SchedulerConfig) -> Self {
        self.interval = Duration::from_millis(config.tick_ms.max(1));
        self.prepare_lead = match config.prepare_lead_secs {
            0 => None,
            // Capped at one day.
            secs => Some(chrono::Duration::seconds(secs.min(86_400) as i64)),
        };
        self.state_path.clone_from(&config.state_path);
        self
    }

    /// Restore tasks from the snapshot file, if one is configured.
    pub fn load_state(&self) -> Result<usize> {
        let Some(path) = &self.state_path else {
            return Ok(0);
        };
        let tasks = load_snapshot_from_path(path)?;
        let restored = self.store.restore(tasks);
        self.saved_revision
            .store(self.store.revision(), Ordering::SeqCst);
        info!(restored, path = %path.display(), "loaded task snapshot");
        Ok(restored)
    }

    /// Start the loop. It exits, flushing the snapshot, once `cancel` fires.
    pub fn run(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(tick_ms = self.interval.as_millis() as u64, "scheduler started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut flush: Option<JoinHandle<()>> = None;

            loop {
                let next_start = self.until_next_start(Utc::now());
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.tick(Utc::now());
                    }
                    () = sleep_for(next_start) => {
                        self.tick(Utc::now());
                    }
                }
                // One snapshot write in flight at a time.
                if flush.as_ref().is_none_or(JoinHandle::is_finished) {
                    flush = Some(tokio::spawn(self.clone().persist()));
                }
            }

            if let Some(pending) = flush {
                let _ = pending.await;
            }
            self.clone().persist().await;
            info!("scheduler stopped");
        })
    }

    /// One check cycle at `now`. Returns the ids fired.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<String> {
        if let Some(lead) = self.prepare_lead {
            for task in self.store.pending_to_prepare(now, lead) {
                if matches!(self.store.mark_prepared(&task.task_id), Ok(true)) {
                    tokio::spawn(self.clone().prepare_devices(task));
                }
            }
        }

        let mut fired = Vec::new();
        for task in self.store.pending_due(now) {
            match self.fire(&task.task_id) {
                Ok(_) => fired.push(task.task_id),
                Err(e @ (RushError::IllegalTransition { .. } | RushError::NotFound(_))) => {
                    debug!(task_id = %task.task_id, "skipped firing: {e}");
                }
                Err(e) => warn!(task_id = %task.task_id, "cannot fire task: {e}"),
            }
        }
        if fired.is_empty() {
            debug!("scheduler tick: nothing due");
        }
        fired
    }

    /// Time until the earliest pending start, when that comes before the
    /// next regular tick.
    fn until_next_start(&self, now: DateTime<Utc>) -> Option<Duration> {
        let wait = (self.store.next_pending_start()? - now).to_std().ok()?;
        (!wait.is_zero() && wait < self.interval).then_some(wait)
    }

    /// Move a pending task to `running` and hand it to the executor.
    pub fn fire(&self, task_id: &str) -> Result<Task> {
        let task = self
            .store
            .transition(task_id, TaskStatus::Running, None)?;
        let lateness_ms = (Utc::now() - task.start_time).num_milliseconds();
        info!(task_id, lateness_ms, "task fired");
        drop(self.executor.run(task.clone()));
        Ok(task)
    }

    /// Warm up every live device of a pending task. Failures are logged.
    async fn prepare_devices(self, task: Task) {
        let Ok(cancel) = self.store.cancellation(&task.task_id) else {
            return;
        };
        let mut jobs = JoinSet::new();
        for device_id in &task.device_ids {
            if cancel.is_cancelled() {
                debug!(task_id = %task.task_id, "task cancelled; preparation abandoned");
                break;
            }
            if !self.registry.is_live(device_id).await {
                debug!(task_id = %task.task_id, device_id, "skipping preparation of offline device");
                continue;
            }
            let Some(device) = self.registry.get(device_id) else {
                continue;
            };
            let driver = Arc::clone(&self.driver);
            let task = task.clone();
            jobs.spawn(async move {
                if let Err(e) = driver.prepare(&device, &task).await {
                    warn!(task_id = %task.task_id, device_id = %device.device_id, "device preparation failed: {e}");
                }
            });
        }
        while jobs.join_next().await.is_some() {}
        info!(task_id = %task.task_id, "devices prepared");
    }

    /// Write the snapshot off the runtime threads if the store changed
    /// since the last write.
    async fn persist(self) {
        let Some(path) = self.state_path.clone() else {
            return;
        };
        let revision = self.store.revision();
        if revision == self.saved_revision.load(Ordering::SeqCst) {
            return;
        }
        let tasks = self.store.list();
        match tokio::task::spawn_blocking(move || save_snapshot_to_path(&path, &tasks)).await {
            Ok(Ok(())) => self.saved_revision.store(revision, Ordering::SeqCst),
            Ok(Err(e)) => error!("cannot persist task snapshot: {e}"),
            Err(e) => error!("snapshot writer failed: {e}"),
        }
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}
