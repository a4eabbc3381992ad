//! Single source of truth for task records.
//!
//! Every record sits behind its own mutex, so writes to one task are
//! serialized while different tasks proceed independently. Each record also
//! owns the cancellation token its executor run observes; the token fires
//! when the task reaches a terminal status or is deleted.

use crate::config::{LimitsConfig, SuccessPolicy};
use crate::error::{Result, RushError};
use crate::events::{EventSender, RushEvent};
use crate::task::types::{DeviceOutcome, Task, TaskSpec, TaskStatus};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A per-device write carried alongside a transition.
#[derive(Debug, Clone)]
pub struct OutcomePatch {
    pub device_id: String,
    pub outcome: DeviceOutcome,
}

impl OutcomePatch {
    #[must_use]
    pub fn new(device_id: impl Into<String>, outcome: DeviceOutcome) -> Self {
        Self {
            device_id: device_id.into(),
            outcome,
        }
    }
}

struct TaskEntry {
    task_id: String,
    record: Mutex<Task>,
    cancel: CancellationToken,
}

impl TaskEntry {
    fn new(task: Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            record: Mutex::new(task),
            cancel: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Task> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct TaskStore {
    /// Creation order.
    entries: RwLock<Vec<Arc<TaskEntry>>>,
    policy: SuccessPolicy,
    max_quantity: u32,
    max_tasks: usize,
    /// Bumped on every committed mutation; drives snapshot flushing.
    revision: AtomicU64,
    events: EventSender,
}

impl TaskStore {
    #[must_use]
    pub fn new(policy: SuccessPolicy, limits: &LimitsConfig, events: EventSender) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            policy,
            max_quantity: limits.max_quantity,
            max_tasks: limits.max_tasks,
            revision: AtomicU64::new(0),
            events,
        }
    }

    /// Validate a spec and store it as a `pending` task.
    pub fn create(&self, spec: TaskSpec) -> Result<Task> {
        let task = spec.into_task(self.max_quantity)?;

        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            if entries.len() >= self.max_tasks {
                return Err(RushError::Validation(format!(
                    "task limit of {} reached; delete finished tasks first",
                    self.max_tasks
                )));
            }
            if entries.iter().any(|e| e.task_id == task.task_id) {
                return Err(RushError::Validation(format!(
                    "task {} already exists",
                    task.task_id
                )));
            }
            entries.push(Arc::new(TaskEntry::new(task.clone())));
        }

        self.bump();
        info!(
            task_id = %task.task_id,
            event = %task.event_name,
            start_time = %task.start_time,
            devices = task.device_ids.len(),
            "task created"
        );
        let _ = self.events.send(RushEvent::TaskCreated {
            task_id: task.task_id.clone(),
        });
        Ok(task)
    }

    pub fn get(&self, task_id: &str) -> Result<Task> {
        Ok(self.entry(task_id)?.lock().clone())
    }

    /// All tasks in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<Task> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.lock().clone())
            .collect()
    }

    /// The only general mutation path.
    ///
    /// `to == current` is accepted solely to carry a per-device patch on a
    /// task that has left `pending`.
    pub fn transition(
        &self,
        task_id: &str,
        to: TaskStatus,
        patch: Option<OutcomePatch>,
    ) -> Result<Task> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock();
        self.commit(&entry, &mut task, to, patch)?;
        Ok(task.clone())
    }

    /// Record a device outcome and settle the task status under one lock.
    ///
    /// A device whose outcome is already terminal keeps it. Outcomes for a
    /// task that is no longer running are kept as detail only.
    pub fn record_outcome(
        &self,
        task_id: &str,
        device_id: &str,
        outcome: DeviceOutcome,
    ) -> Result<Task> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock();

        if task
            .outcome(device_id)
            .is_some_and(|existing| existing.state.is_terminal())
        {
            debug!(task_id, device_id, "device outcome already settled");
            return Ok(task.clone());
        }

        let to = if task.status == TaskStatus::Running && outcome.state.is_terminal() {
            let mut projected = task.attempt_results.clone();
            projected.insert(device_id.to_owned(), outcome.clone());
            self.policy.settle(&projected).unwrap_or(TaskStatus::Running)
        } else {
            task.status
        };

        self.commit(
            &entry,
            &mut task,
            to,
            Some(OutcomePatch::new(device_id, outcome)),
        )?;
        Ok(task.clone())
    }

    /// Gate for starting attempt number `attempt` on a device.
    ///
    /// Returns `false` once the task has left `running` or been cancelled, so
    /// no attempt can begin after a settling write.
    pub fn begin_attempt(&self, task_id: &str, device_id: &str, attempt: u32) -> Result<bool> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock();
        if task.status != TaskStatus::Running || entry.cancel.is_cancelled() {
            return Ok(false);
        }
        self.commit(
            &entry,
            &mut task,
            TaskStatus::Running,
            Some(OutcomePatch::new(device_id, DeviceOutcome::in_progress(attempt))),
        )?;
        Ok(true)
    }

    /// Stop a pending or running task.
    pub fn stop(&self, task_id: &str) -> Result<Task> {
        self.transition(task_id, TaskStatus::Stopped, None)
    }

    /// Cancel any in-flight run, then remove the record.
    pub fn delete(&self, task_id: &str) -> Result<()> {
        let removed = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let index = entries
                .iter()
                .position(|e| e.task_id == task_id)
                .ok_or_else(|| RushError::NotFound(format!("task {task_id}")))?;
            entries[index].cancel.cancel();
            entries.remove(index)
        };

        self.bump();
        info!(task_id = %removed.task_id, "task deleted");
        let _ = self.events.send(RushEvent::TaskDeleted {
            task_id: removed.task_id.clone(),
        });
        Ok(())
    }

    /// Token observed by the task's executor run.
    pub fn cancellation(&self, task_id: &str) -> Result<CancellationToken> {
        Ok(self.entry(task_id)?.cancel.clone())
    }

    /// Pending tasks whose start time has passed, earliest first.
    #[must_use]
    pub fn pending_due(&self, now: DateTime<Utc>) -> Vec<Task> {
        let mut due: Vec<Task> = self
            .list()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending && t.start_time <= now)
            .collect();
        due.sort_by_key(|t| t.start_time);
        due
    }

    /// Pending, unprepared tasks within `lead` of their start time.
    #[must_use]
    pub fn pending_to_prepare(&self, now: DateTime<Utc>, lead: chrono::Duration) -> Vec<Task> {
        self.list()
            .into_iter()
            .filter(|t| {
                t.status == TaskStatus::Pending
                    && t.prepared_at.is_none()
                    && t.start_time - lead <= now
            })
            .collect()
    }

    /// Earliest start time among pending tasks.
    #[must_use]
    pub fn next_pending_start(&self) -> Option<DateTime<Utc>> {
        self.list()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.start_time)
            .min()
    }

    /// Claim preparation for a pending task. Returns `true` exactly once.
    pub fn mark_prepared(&self, task_id: &str) -> Result<bool> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock();
        if task.status != TaskStatus::Pending || task.prepared_at.is_some() {
            return Ok(false);
        }
        task.prepared_at = Some(Utc::now());
        self.bump();
        Ok(true)
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Load persisted records, skipping ids already present.
    ///
    /// A task persisted as `running` was interrupted by a restart; it is
    /// settled `failed` with its open devices marked failed.
    pub fn restore(&self, tasks: Vec<Task>) -> usize {
        let mut restored = 0;
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            for mut task in tasks {
                if entries.iter().any(|e| e.task_id == task.task_id) {
                    continue;
                }
                if task.status == TaskStatus::Running {
                    for outcome in task.attempt_results.values_mut() {
                        if !outcome.state.is_terminal() {
                            *outcome = DeviceOutcome::failed(
                                outcome.attempts,
                                "interrupted by restart",
                            );
                        }
                    }
                    task.status = TaskStatus::Failed;
                    task.finished_at = Some(Utc::now());
                }
                let entry = TaskEntry::new(task);
                if entry.lock().status.is_terminal() {
                    entry.cancel.cancel();
                }
                entries.push(Arc::new(entry));
                restored += 1;
            }
        }
        if restored > 0 {
            self.bump();
        }
        restored
    }

    fn entry(&self, task_id: &str) -> Result<Arc<TaskEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.task_id == task_id)
            .cloned()
            .ok_or_else(|| RushError::NotFound(format!("task {task_id}")))
    }

    fn commit(
        &self,
        entry: &TaskEntry,
        task: &mut Task,
        to: TaskStatus,
        patch: Option<OutcomePatch>,
    ) -> Result<()> {
        let from = task.status;
        let legal = if from == to {
            patch.is_some() && from != TaskStatus::Pending
        } else if matches!(to, TaskStatus::Success | TaskStatus::Failed) {
            // Outcome statuses must follow from the device results.
            let mut projected = task.attempt_results.clone();
            if let Some(patch) = &patch {
                if let Some(slot) = projected.get_mut(&patch.device_id) {
                    *slot = patch.outcome.clone();
                }
            }
            from.can_transition_to(to) && self.policy.settle(&projected) == Some(to)
        } else {
            from.can_transition_to(to)
        };
        if !legal {
            return Err(RushError::IllegalTransition {
                task_id: task.task_id.clone(),
                from,
                to,
            });
        }

        if let Some(patch) = patch {
            let Some(slot) = task.attempt_results.get_mut(&patch.device_id) else {
                return Err(RushError::Validation(format!(
                    "device {} is not assigned to task {}",
                    patch.device_id, task.task_id
                )));
            };
            *slot = patch.outcome.clone();
            let _ = self.events.send(RushEvent::DeviceOutcome {
                task_id: task.task_id.clone(),
                device_id: patch.device_id,
                outcome: patch.outcome,
            });
        }

        if from != to {
            task.status = to;
            let now = Utc::now();
            if to == TaskStatus::Running {
                task.started_at = Some(now);
            }
            if to.is_terminal() {
                task.finished_at = Some(now);
                entry.cancel.cancel();
            }
            info!(task_id = %task.task_id, %from, %to, "task status changed");
            let _ = self.events.send(RushEvent::TaskStatusChanged {
                task_id: task.task_id.clone(),
                status: to,
            });
        }

        self.bump();
        Ok(())
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::events::event_bus;
    use crate::task::types::AttemptState;

    fn store(policy: SuccessPolicy) -> TaskStore {
        TaskStore::new(policy, &LimitsConfig::default(), event_bus(64))
    }

    fn spec(id: &str, devices: &[&str], start: &str) -> TaskSpec {
        TaskSpec {
            task_id: Some(id.to_owned()),
            event_name: "Mayday Live".to_owned(),
            event_url: "https://m.damai.cn/item/42".to_owned(),
            start_time: start.to_owned(),
            target_price: None,
            quantity: 1,
            device_ids: devices.iter().map(|d| (*d).to_owned()).collect(),
        }
    }

    fn running(store: &TaskStore, id: &str, devices: &[&str]) {
        store
            .create(spec(id, devices, "2026-01-01T00:00:00Z"))
            .unwrap();
        store.transition(id, TaskStatus::Running, None).unwrap();
    }

    #[test]
    fn create_then_get_is_pending_with_open_outcomes() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        store
            .create(spec("t1", &["a", "b"], "2026-01-01T00:00:00Z"))
            .unwrap();

        let task = store.get("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempt_results.len(), 2);
        assert!(
            task.attempt_results
                .values()
                .all(|o| o.state == AttemptState::NotStarted)
        );
    }

    #[test]
    fn duplicate_task_id_rejected() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        store
            .create(spec("t1", &["a"], "2026-01-01T00:00:00Z"))
            .unwrap();
        let err = store
            .create(spec("t1", &["b"], "2026-01-01T00:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, RushError::Validation(_)));
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn task_limit_enforced() {
        let limits = LimitsConfig {
            max_quantity: 6,
            max_tasks: 1,
        };
        let store = TaskStore::new(SuccessPolicy::FirstSuccessWins, &limits, event_bus(8));
        store
            .create(spec("t1", &["a"], "2026-01-01T00:00:00Z"))
            .unwrap();
        assert!(
            store
                .create(spec("t2", &["a"], "2026-01-01T00:00:00Z"))
                .is_err()
        );
    }

    #[test]
    fn list_is_creation_order() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        for id in ["c", "a", "b"] {
            store
                .create(spec(id, &["d"], "2026-01-01T00:00:00Z"))
                .unwrap();
        }
        let ids: Vec<String> = store.list().into_iter().map(|t| t.task_id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn illegal_transition_leaves_record_unchanged() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        running(&store, "t1", &["a"]);
        store
            .record_outcome("t1", "a", DeviceOutcome::succeeded(1, None))
            .unwrap();
        let before = store.get("t1").unwrap();
        assert_eq!(before.status, TaskStatus::Success);

        let err = store
            .transition("t1", TaskStatus::Running, None)
            .unwrap_err();
        assert!(matches!(
            err,
            RushError::IllegalTransition {
                from: TaskStatus::Success,
                to: TaskStatus::Running,
                ..
            }
        ));
        assert_eq!(store.get("t1").unwrap(), before);
    }

    #[test]
    fn outcome_status_cannot_be_forced() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        running(&store, "t1", &["a", "b"]);
        let before = store.get("t1").unwrap();

        for to in [TaskStatus::Success, TaskStatus::Failed] {
            let err = store.transition("t1", to, None).unwrap_err();
            assert!(matches!(err, RushError::IllegalTransition { .. }));
        }
        let half = OutcomePatch::new("a", DeviceOutcome::failed(3, "sold out"));
        assert!(
            store
                .transition("t1", TaskStatus::Failed, Some(half))
                .is_err()
        );
        assert_eq!(store.get("t1").unwrap(), before);

        let win = OutcomePatch::new("b", DeviceOutcome::succeeded(1, None));
        let task = store
            .transition("t1", TaskStatus::Success, Some(win))
            .unwrap();
        assert_eq!(task.status, TaskStatus::Success);
    }

    #[test]
    fn pending_to_pending_without_patch_is_illegal() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        store
            .create(spec("t1", &["a"], "2026-01-01T00:00:00Z"))
            .unwrap();
        let patch = OutcomePatch::new("a", DeviceOutcome::in_progress(1));
        assert!(
            store
                .transition("t1", TaskStatus::Pending, Some(patch))
                .is_err()
        );
        assert!(store.transition("t1", TaskStatus::Pending, None).is_err());
    }

    #[test]
    fn stopping_pending_task_cancels_token() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        store
            .create(spec("t1", &["a"], "2030-01-01T00:00:00Z"))
            .unwrap();
        let token = store.cancellation("t1").unwrap();

        let task = store.stop("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Stopped);
        assert!(token.is_cancelled());
        assert!(task.finished_at.is_some());
    }

    #[test]
    fn first_success_settles_and_cancels() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        running(&store, "t1", &["a", "b", "c"]);
        let token = store.cancellation("t1").unwrap();

        assert!(store.begin_attempt("t1", "a", 1).unwrap());
        let task = store
            .record_outcome("t1", "b", DeviceOutcome::succeeded(2, None))
            .unwrap();

        assert_eq!(task.status, TaskStatus::Success);
        assert!(token.is_cancelled());
        assert!(!store.begin_attempt("t1", "c", 1).unwrap());
        assert_eq!(
            store.get("t1").unwrap().outcome("a").unwrap().state,
            AttemptState::InProgress
        );
    }

    #[test]
    fn all_failed_settles_failed() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        running(&store, "t1", &["a", "b"]);
        let task = store
            .record_outcome("t1", "a", DeviceOutcome::failed(3, "exhausted"))
            .unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        let task = store
            .record_outcome("t1", "b", DeviceOutcome::failed(0, "device unavailable"))
            .unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn all_devices_policy_waits_for_every_device() {
        let store = store(SuccessPolicy::AllDevices);
        running(&store, "t1", &["a", "b"]);
        let token = store.cancellation("t1").unwrap();

        let task = store
            .record_outcome("t1", "a", DeviceOutcome::succeeded(1, None))
            .unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(!token.is_cancelled());

        let task = store
            .record_outcome("t1", "b", DeviceOutcome::failed(3, "sold out"))
            .unwrap();
        assert_eq!(task.status, TaskStatus::Success);
    }

    #[test]
    fn late_outcome_after_stop_keeps_stopped() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        running(&store, "t1", &["a"]);
        store.stop("t1").unwrap();

        let task = store
            .record_outcome("t1", "a", DeviceOutcome::succeeded(1, None))
            .unwrap();
        assert_eq!(task.status, TaskStatus::Stopped);
        assert_eq!(task.outcome("a").unwrap().state, AttemptState::Succeeded);
    }

    #[test]
    fn settled_device_outcome_is_final() {
        let store = store(SuccessPolicy::AllDevices);
        running(&store, "t1", &["a", "b"]);
        store
            .record_outcome("t1", "a", DeviceOutcome::succeeded(1, None))
            .unwrap();
        let task = store
            .record_outcome("t1", "a", DeviceOutcome::failed(1, "cancelled"))
            .unwrap();
        assert_eq!(task.outcome("a").unwrap().state, AttemptState::Succeeded);
    }

    #[test]
    fn unknown_device_patch_rejected() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        running(&store, "t1", &["a"]);
        let err = store
            .record_outcome("t1", "zz", DeviceOutcome::failed(1, "x"))
            .unwrap_err();
        assert!(matches!(err, RushError::Validation(_)));
    }

    #[test]
    fn delete_cancels_and_blocks_late_writes() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        running(&store, "t1", &["a"]);
        let token = store.cancellation("t1").unwrap();

        store.delete("t1").unwrap();
        assert!(token.is_cancelled());
        assert!(matches!(store.get("t1"), Err(RushError::NotFound(_))));
        assert!(matches!(
            store.record_outcome("t1", "a", DeviceOutcome::succeeded(1, None)),
            Err(RushError::NotFound(_))
        ));
        assert!(matches!(store.delete("t1"), Err(RushError::NotFound(_))));
        assert!(store.list().is_empty());
    }

    #[test]
    fn pending_due_sorted_and_filtered() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        store
            .create(spec("late", &["a"], "2026-01-01T00:00:10Z"))
            .unwrap();
        store
            .create(spec("early", &["a"], "2026-01-01T00:00:05Z"))
            .unwrap();
        store
            .create(spec("future", &["a"], "2026-01-01T01:00:00Z"))
            .unwrap();

        let now = "2026-01-01T00:00:30Z".parse::<DateTime<Utc>>().unwrap();
        let due: Vec<String> = store
            .pending_due(now)
            .into_iter()
            .map(|t| t.task_id)
            .collect();
        assert_eq!(due, vec!["early", "late"]);
        assert_eq!(
            store.next_pending_start().unwrap().to_rfc3339(),
            "2026-01-01T00:00:05+00:00"
        );
    }

    #[test]
    fn mark_prepared_claims_once() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        store
            .create(spec("t1", &["a"], "2026-01-01T00:00:30Z"))
            .unwrap();
        let now = "2026-01-01T00:00:10Z".parse::<DateTime<Utc>>().unwrap();

        assert!(
            store
                .pending_to_prepare(now, chrono::Duration::seconds(10))
                .is_empty()
        );
        assert_eq!(
            store
                .pending_to_prepare(now, chrono::Duration::seconds(30))
                .len(),
            1
        );
        assert!(store.mark_prepared("t1").unwrap());
        assert!(!store.mark_prepared("t1").unwrap());
        assert!(
            store
                .pending_to_prepare(now, chrono::Duration::seconds(30))
                .is_empty()
        );
        assert_eq!(store.get("t1").unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn restore_settles_interrupted_runs() {
        let source = store(SuccessPolicy::FirstSuccessWins);
        running(&source, "t1", &["a", "b"]);
        source
            .record_outcome("t1", "a", DeviceOutcome::failed(3, "sold out"))
            .unwrap();
        source
            .create(spec("t2", &["a"], "2030-01-01T00:00:00Z"))
            .unwrap();

        let target = store(SuccessPolicy::FirstSuccessWins);
        assert_eq!(target.restore(source.list()), 2);
        assert_eq!(target.restore(source.list()), 0);

        let t1 = target.get("t1").unwrap();
        assert_eq!(t1.status, TaskStatus::Failed);
        assert_eq!(
            t1.outcome("a").unwrap().reason.as_deref(),
            Some("sold out")
        );
        assert_eq!(
            t1.outcome("b").unwrap().reason.as_deref(),
            Some("interrupted by restart")
        );
        assert!(target.cancellation("t1").unwrap().is_cancelled());
        assert_eq!(target.get("t2").unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn mutations_publish_events() {
        let bus = event_bus(64);
        let mut rx = bus.subscribe();
        let store = TaskStore::new(SuccessPolicy::FirstSuccessWins, &LimitsConfig::default(), bus);
        running(&store, "t1", &["a"]);
        store
            .record_outcome("t1", "a", DeviceOutcome::succeeded(1, None))
            .unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec![
                "task.created",
                "task.status_changed",
                "task.device_outcome",
                "task.status_changed"
            ]
        );
    }

    #[test]
    fn revision_advances_on_commit_only() {
        let store = store(SuccessPolicy::FirstSuccessWins);
        let r0 = store.revision();
        store
            .create(spec("t1", &["a"], "2026-01-01T00:00:00Z"))
            .unwrap();
        let r1 = store.revision();
        assert!(r1 > r0);
        let _ = store.transition("t1", TaskStatus::Success, None);
        assert_eq!(store.revision(), r1);
    }
}
