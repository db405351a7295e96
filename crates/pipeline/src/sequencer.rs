//! Per-key admission control.
//!
//! Each [`TaskKey`] has a lane holding at most one executing work unit and
//! the units of at most one waiting task. A unit only becomes the executing
//! one when the lane worker claims it, so a submission that arrives before
//! the claim still displaces it. Lanes live in a sharded [`DashMap`], so
//! admission for one key only ever locks that key's shard, never performs
//! I/O under the lock, and does not contend with unrelated keys.

use std::collections::VecDeque;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use orch_core::compute::ComputeItem;
use orch_core::types::TaskKey;

/// One compute item of one task, the unit the sequencer orders.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    pub task_id: String,
    pub item_index: i32,
    pub item: ComputeItem,
}

impl WorkUnit {
    pub fn new(task_id: impl Into<String>, item_index: i32, item: ComputeItem) -> Self {
        Self {
            task_id: task_id.into(),
            item_index,
            item,
        }
    }

    pub fn key(&self) -> TaskKey {
        self.item.key()
    }

    fn same_unit(&self, other: &WorkUnit) -> bool {
        self.task_id == other.task_id && self.item_index == other.item_index
    }
}

/// Result of [`KeySequencer::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The key had no lane. The unit waits as its pending unit and the caller
    /// must start a lane worker for the key.
    Opened,
    /// The lane already has a worker; the unit waits behind it. Pending units
    /// of an earlier task that it displaced are returned and must be recorded
    /// as superseded.
    Queued { superseded: Vec<WorkUnit> },
}

#[derive(Debug)]
struct Lane {
    executing: Option<WorkUnit>,
    /// Waiting units, all from the most recently submitted task, in item order.
    pending: VecDeque<WorkUnit>,
}

#[derive(Debug, Default)]
pub struct KeySequencer {
    lanes: DashMap<TaskKey, Lane>,
}

impl KeySequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a unit for its key.
    ///
    /// Units of one task never displace each other; a unit of another task
    /// replaces everything still waiting on the key.
    pub fn submit(&self, unit: WorkUnit) -> SubmitOutcome {
        match self.lanes.entry(unit.key()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Lane {
                    executing: None,
                    pending: VecDeque::from([unit]),
                });
                SubmitOutcome::Opened
            }
            Entry::Occupied(mut occupied) => {
                let lane = occupied.get_mut();
                let superseded = match lane.pending.front() {
                    Some(waiting) if waiting.task_id != unit.task_id => {
                        lane.pending.drain(..).collect()
                    }
                    _ => Vec::new(),
                };
                lane.pending.push_back(unit);
                SubmitOutcome::Queued { superseded }
            }
        }
    }

    /// Start executing the next waiting unit for `key`.
    ///
    /// Called by the lane worker right before execution begins. Returns
    /// `None` when there is nothing to claim or a unit is already executing;
    /// an empty lane is dropped.
    pub fn claim(&self, key: &TaskKey) -> Option<WorkUnit> {
        let Entry::Occupied(mut occupied) = self.lanes.entry(key.clone()) else {
            return None;
        };

        if let Some(running) = &occupied.get().executing {
            tracing::warn!(
                key = %key,
                executing = %running.task_id,
                "Claim on a lane that is already executing",
            );
            return None;
        }

        match occupied.get_mut().pending.pop_front() {
            Some(unit) => {
                occupied.get_mut().executing = Some(unit.clone());
                Some(unit)
            }
            None => {
                occupied.remove();
                None
            }
        }
    }

    /// Release the key held by `finished`.
    ///
    /// Returns `true` when units are waiting, in which case the worker should
    /// [`claim`](Self::claim) again. Otherwise the lane is dropped. A
    /// `finished` unit that is not the lane's executing unit leaves the lane
    /// untouched.
    pub fn complete(&self, finished: &WorkUnit) -> bool {
        let Entry::Occupied(mut occupied) = self.lanes.entry(finished.key()) else {
            tracing::warn!(
                task_id = %finished.task_id,
                item_index = finished.item_index,
                "Completed unit has no lane",
            );
            return false;
        };

        let is_executing = occupied
            .get()
            .executing
            .as_ref()
            .is_some_and(|running| running.same_unit(finished));
        if !is_executing {
            tracing::warn!(
                task_id = %finished.task_id,
                item_index = finished.item_index,
                "Completed unit is not the lane's executing unit",
            );
            return false;
        }

        occupied.get_mut().executing = None;
        if occupied.get().pending.is_empty() {
            occupied.remove();
            false
        } else {
            true
        }
    }

    /// Task id of the unit executing for `key`, if any.
    pub fn executing(&self, key: &TaskKey) -> Option<String> {
        self.lanes
            .get(key)
            .and_then(|lane| lane.executing.as_ref().map(|u| u.task_id.clone()))
    }

    /// Task id of the units waiting for `key`, if any.
    pub fn pending(&self, key: &TaskKey) -> Option<String> {
        self.lanes
            .get(key)
            .and_then(|lane| lane.pending.back().map(|u| u.task_id.clone()))
    }

    /// Number of keys with a lane.
    pub fn active_lanes(&self) -> usize {
        self.lanes.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use orch_core::compute::ServiceKind;

    use super::*;

    fn unit(task_id: &str, scenario: &str) -> WorkUnit {
        unit_at(task_id, 0, scenario)
    }

    fn unit_at(task_id: &str, item_index: i32, scenario: &str) -> WorkUnit {
        WorkUnit::new(
            task_id,
            item_index,
            ComputeItem::new(scenario, "b1").with_service(ServiceKind::Revenue, serde_json::json!({})),
        )
    }

    fn key(scenario: &str) -> TaskKey {
        TaskKey::new(scenario, "b1")
    }

    /// Open a lane for `task_id` and claim it, as a lane worker would.
    fn running(seq: &KeySequencer, task_id: &str, scenario: &str) -> WorkUnit {
        assert_eq!(seq.submit(unit(task_id, scenario)), SubmitOutcome::Opened);
        seq.claim(&key(scenario)).expect("unit to claim")
    }

    #[test]
    fn idle_key_opens_a_lane_without_executing() {
        let seq = KeySequencer::new();
        assert_eq!(seq.submit(unit("a", "s1")), SubmitOutcome::Opened);
        assert_eq!(seq.executing(&key("s1")), None);
        assert_eq!(seq.pending(&key("s1")).as_deref(), Some("a"));

        assert_eq!(seq.claim(&key("s1")).unwrap().task_id, "a");
        assert_eq!(seq.executing(&key("s1")).as_deref(), Some("a"));
        assert_eq!(seq.pending(&key("s1")), None);
    }

    #[test]
    fn unclaimed_unit_is_superseded() {
        let seq = KeySequencer::new();
        seq.submit(unit("a", "s1"));

        assert_matches!(
            seq.submit(unit("b", "s1")),
            SubmitOutcome::Queued { superseded } if superseded.len() == 1 && superseded[0].task_id == "a"
        );
        assert_eq!(seq.claim(&key("s1")).unwrap().task_id, "b");
        assert!(!seq.complete(&unit("b", "s1")));
        assert_eq!(seq.active_lanes(), 0);
    }

    #[test]
    fn busy_key_queues_and_latest_wins() {
        let seq = KeySequencer::new();
        running(&seq, "a", "s1");

        assert_matches!(
            seq.submit(unit("b", "s1")),
            SubmitOutcome::Queued { superseded } if superseded.is_empty()
        );
        assert_matches!(
            seq.submit(unit("c", "s1")),
            SubmitOutcome::Queued { superseded } if superseded.len() == 1 && superseded[0].task_id == "b"
        );
        assert_eq!(seq.executing(&key("s1")).as_deref(), Some("a"));
        assert_eq!(seq.pending(&key("s1")).as_deref(), Some("c"));
    }

    #[test]
    fn items_of_one_task_on_one_key_all_wait() {
        let seq = KeySequencer::new();
        assert_eq!(seq.submit(unit_at("t", 0, "s1")), SubmitOutcome::Opened);
        assert_matches!(
            seq.submit(unit_at("t", 1, "s1")),
            SubmitOutcome::Queued { superseded } if superseded.is_empty()
        );

        let first = seq.claim(&key("s1")).unwrap();
        assert_eq!(first.item_index, 0);
        assert!(seq.complete(&first));
        let second = seq.claim(&key("s1")).unwrap();
        assert_eq!(second.item_index, 1);
        assert!(!seq.complete(&second));
    }

    #[test]
    fn newer_task_supersedes_every_waiting_item_of_older_task() {
        let seq = KeySequencer::new();
        running(&seq, "busy", "s1");
        seq.submit(unit_at("t", 0, "s1"));
        seq.submit(unit_at("t", 1, "s1"));

        assert_matches!(
            seq.submit(unit("u", "s1")),
            SubmitOutcome::Queued { superseded } if superseded.iter().map(|u| u.item_index).collect::<Vec<_>>() == vec![0, 1]
        );
    }

    #[test]
    fn completion_hands_over_then_frees_lane() {
        let seq = KeySequencer::new();
        let a = running(&seq, "a", "s1");
        seq.submit(unit("b", "s1"));

        assert!(seq.complete(&a));
        let next = seq.claim(&key("s1")).expect("b should be claimable");
        assert_eq!(next.task_id, "b");
        assert_eq!(seq.active_lanes(), 1);

        assert!(!seq.complete(&next));
        assert_eq!(seq.active_lanes(), 0);
        assert_eq!(seq.submit(unit("c", "s1")), SubmitOutcome::Opened);
    }

    #[test]
    fn claim_while_executing_is_refused() {
        let seq = KeySequencer::new();
        running(&seq, "a", "s1");
        seq.submit(unit("b", "s1"));
        assert!(seq.claim(&key("s1")).is_none());
        assert_eq!(seq.pending(&key("s1")).as_deref(), Some("b"));
    }

    #[test]
    fn completing_a_stranger_is_ignored() {
        let seq = KeySequencer::new();
        running(&seq, "a", "s1");
        assert!(!seq.complete(&unit("zzz", "s1")));
        assert_eq!(seq.executing(&key("s1")).as_deref(), Some("a"));
    }

    #[test]
    fn different_keys_are_independent() {
        let seq = KeySequencer::new();
        assert_eq!(seq.submit(unit("a", "s1")), SubmitOutcome::Opened);
        assert_eq!(seq.submit(unit("b", "s2")), SubmitOutcome::Opened);
        assert_eq!(seq.active_lanes(), 2);
    }

    #[test]
    fn n_submissions_behind_a_busy_lane_supersede_all_but_latest() {
        let seq = KeySequencer::new();
        let first = running(&seq, "running", "s1");

        let n = 20;
        let mut superseded = Vec::new();
        for i in 0..n {
            if let SubmitOutcome::Queued { superseded: displaced } =
                seq.submit(unit(&format!("t{i}"), "s1"))
            {
                superseded.extend(displaced.into_iter().map(|u| u.task_id));
            }
        }
        assert_eq!(superseded.len(), n - 1);
        assert!(seq.complete(&first));
        assert_eq!(seq.claim(&key("s1")).unwrap().task_id, format!("t{}", n - 1));
    }

    #[test]
    fn concurrent_submitters_leave_exactly_one_pending() {
        let seq = Arc::new(KeySequencer::new());
        running(&seq, "running", "s1");

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| match seq.submit(unit(&format!("t{t}-{i}"), "s1")) {
                            SubmitOutcome::Queued { superseded } => superseded.len(),
                            SubmitOutcome::Opened => 0,
                        })
                        .sum::<usize>()
                })
            })
            .collect();
        let superseded: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(superseded, 8 * 50 - 1);
        assert!(seq.pending(&key("s1")).is_some());
    }
}
