//! Scripted in-memory [`ActionSource`] and recording progress sink for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::action::{Action, ActionId};
use crate::api::{ActionSource, ApiError};
use crate::progress::ProgressSink;

/// Replays a fixed sequence of snapshots per action.
///
/// Each request pops the next snapshot of every requested ID; the last
/// snapshot repeats forever. IDs without a script are omitted from responses.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<ActionId, VecDeque<Action>>>,
    gaps: Mutex<HashMap<ActionId, usize>>,
    failures: Mutex<VecDeque<ApiError>>,
    requests: Mutex<Vec<Vec<ActionId>>>,
    latency: Option<Duration>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, id: u64, snapshots: Vec<Action>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(ActionId(id), snapshots.into());
        self
    }

    /// Leave `id` out of the next `responses` answers that ask for it.
    pub fn missing_for(self, id: u64, responses: usize) -> Self {
        self.gaps.lock().unwrap().insert(ActionId(id), responses);
        self
    }

    /// Queue an error returned by the next request, before any script is consulted.
    pub fn fail_next(self, err: ApiError) -> Self {
        self.failures.lock().unwrap().push_back(err);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Vec<ActionId>> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests that asked for `id`.
    pub fn fetch_count(&self, id: u64) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|batch| batch.contains(&ActionId(id)))
            .count()
    }
}

impl ActionSource for ScriptedSource {
    async fn fetch_actions(&self, ids: &[ActionId]) -> Result<Vec<Action>, ApiError> {
        self.requests.lock().unwrap().push(ids.to_vec());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut scripts = self.scripts.lock().unwrap();
        let mut gaps = self.gaps.lock().unwrap();
        let mut out = Vec::new();
        for id in ids {
            if let Some(left) = gaps.get_mut(id)
                && *left > 0
            {
                *left -= 1;
                continue;
            }
            let Some(queue) = scripts.get_mut(id) else {
                continue;
            };
            let snapshot = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(snapshot) = snapshot {
                out.push(snapshot);
            }
        }
        Ok(out)
    }
}

/// Records every update it receives.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<Action>>,
    finished: Mutex<u32>,
}

impl RecordingSink {
    pub fn updates(&self) -> Vec<Action> {
        self.updates.lock().unwrap().clone()
    }

    pub fn updates_for(&self, id: u64) -> Vec<Action> {
        self.updates()
            .into_iter()
            .filter(|a| a.id == ActionId(id))
            .collect()
    }

    pub fn finish_calls(&self) -> u32 {
        *self.finished.lock().unwrap()
    }
}

impl ProgressSink for RecordingSink {
    fn on_update(&self, action: &Action) {
        self.updates.lock().unwrap().push(action.clone());
    }

    fn finish(&self) {
        *self.finished.lock().unwrap() += 1;
    }
}
