//! Task status state machine and outcome aggregation.
//!
//! ```text
//! pending ──start/fire──▶ running ──first success──▶ success
//!    │                       ├──all devices failed──▶ failed
//!    └────────stop───────────┴──stop───────────────▶ stopped
//! ```
//!
//! Terminal states never move again; a finished task can only be deleted.

use crate::config::SuccessPolicy;
use crate::task::types::{AttemptState, DeviceOutcome, TaskStatus};
use std::collections::BTreeMap;

impl TaskStatus {
    /// Whether the transition table allows `self -> to`.
    #[must_use]
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::{Failed, Pending, Running, Stopped, Success};
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, Stopped)
                | (Running, Success)
                | (Running, Failed)
                | (Running, Stopped)
        )
    }
}

impl SuccessPolicy {
    /// Derive the task status a running task should settle into, if any.
    ///
    /// Returns `None` while the outcome is still open.
    #[must_use]
    pub fn settle(self, results: &BTreeMap<String, DeviceOutcome>) -> Option<TaskStatus> {
        let any_succeeded = results
            .values()
            .any(|o| o.state == AttemptState::Succeeded);
        let all_settled = results.values().all(|o| o.state.is_terminal());

        match self {
            Self::FirstSuccessWins if any_succeeded => Some(TaskStatus::Success),
            _ if !all_settled => None,
            _ if any_succeeded => Some(TaskStatus::Success),
            _ => Some(TaskStatus::Failed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskStatus::{Failed, Pending, Running, Stopped, Success};

    const ALL: [TaskStatus; 5] = [Pending, Running, Success, Failed, Stopped];

    #[test]
    fn transition_table_matches_lifecycle() {
        let allowed = [
            (Pending, Running),
            (Pending, Stopped),
            (Running, Success),
            (Running, Failed),
            (Running, Stopped),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_are_dead_ends() {
        for from in [Success, Failed, Stopped] {
            assert!(from.is_terminal());
            assert!(ALL.iter().all(|to| !from.can_transition_to(*to)));
        }
    }

    fn results(states: &[AttemptState]) -> BTreeMap<String, DeviceOutcome> {
        states
            .iter()
            .enumerate()
            .map(|(i, state)| {
                let mut outcome = DeviceOutcome::not_started();
                outcome.state = *state;
                (format!("d{i}"), outcome)
            })
            .collect()
    }

    #[test]
    fn first_success_settles_immediately() {
        let open = results(&[AttemptState::InProgress, AttemptState::Succeeded]);
        assert_eq!(SuccessPolicy::FirstSuccessWins.settle(&open), Some(Success));
        assert_eq!(SuccessPolicy::AllDevices.settle(&open), None);
    }

    #[test]
    fn all_failed_settles_failed() {
        let done = results(&[AttemptState::Failed, AttemptState::Failed]);
        assert_eq!(SuccessPolicy::FirstSuccessWins.settle(&done), Some(Failed));
        assert_eq!(SuccessPolicy::AllDevices.settle(&done), Some(Failed));
    }

    #[test]
    fn all_devices_policy_waits_then_prefers_success() {
        let done = results(&[AttemptState::Failed, AttemptState::Succeeded]);
        assert_eq!(SuccessPolicy::AllDevices.settle(&done), Some(Success));
    }

    #[test]
    fn open_failures_do_not_settle() {
        let open = results(&[AttemptState::Failed, AttemptState::NotStarted]);
        assert_eq!(SuccessPolicy::FirstSuccessWins.settle(&open), None);
    }
}
