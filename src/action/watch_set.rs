use std::collections::{HashMap, HashSet};

use super::types::{Action, ActionId, ActionStatus};

/// Result of applying one fetched snapshot to the [`WatchSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The snapshot replaced the previous one and should be reported.
    Updated,
    /// The snapshot reached a terminal status with this update.
    Finished,
    /// The action was already frozen (or never watched); the snapshot was dropped.
    Ignored,
}

/// Latest known snapshot of every action watched by one wait call.
///
/// Insertion order is preserved so that failures are reported in the order
/// the caller passed the actions. Once an entry is terminal it is frozen.
#[derive(Debug, Default)]
pub struct WatchSet {
    order: Vec<ActionId>,
    entries: HashMap<ActionId, Action>,
    // Consecutive responses that left out a pending ID.
    misses: HashMap<ActionId, u32>,
}

impl WatchSet {
    /// Registers the given descriptors. Duplicate IDs keep their first position.
    pub fn new(actions: &[Action]) -> Self {
        let mut set = Self::default();
        for action in actions {
            if set.entries.contains_key(&action.id) {
                continue;
            }
            set.order.push(action.id);
            set.entries.insert(action.id, normalize(action.clone()));
        }
        set
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: ActionId) -> Option<&Action> {
        self.entries.get(&id)
    }

    /// IDs that still need polling, in registration order.
    pub fn pending_ids(&self) -> Vec<ActionId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.entries.get(id).is_some_and(|a| !a.is_terminal()))
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.entries.values().all(Action::is_terminal)
    }

    /// Replaces the snapshot for `action.id` unless that entry is already terminal.
    pub fn apply(&mut self, action: Action) -> Applied {
        let Some(current) = self.entries.get_mut(&action.id) else {
            return Applied::Ignored;
        };
        if current.is_terminal() {
            return Applied::Ignored;
        }
        let action = normalize(action);
        let finished = action.is_terminal();
        *current = action;
        if finished {
            Applied::Finished
        } else {
            Applied::Updated
        }
    }

    /// All snapshots in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Actions that finished with status `error`, in registration order.
    pub fn failed(&self) -> impl Iterator<Item = &Action> {
        self.iter().filter(|a| a.status == ActionStatus::Error)
    }

    /// Counts, per requested ID, how many responses in a row left it out.
    ///
    /// Returns the IDs (in `requested` order) whose streak reached `limit`.
    /// An ID that shows up again starts over from zero.
    pub fn record_missing(
        &mut self,
        requested: &[ActionId],
        returned: &HashSet<ActionId>,
        limit: u32,
    ) -> Vec<ActionId> {
        let mut exhausted = Vec::new();
        for id in requested {
            if returned.contains(id) {
                self.misses.remove(id);
                continue;
            }
            let streak = self.misses.entry(*id).or_insert(0);
            *streak += 1;
            if *streak >= limit {
                exhausted.push(*id);
            }
        }
        exhausted
    }
}

// A successful action is always reported at 100%, whatever the API sent.
fn normalize(mut action: Action) -> Action {
    if action.status == ActionStatus::Success {
        action.progress = 100;
    }
    action.progress = action.progress.min(100);
    action
}
