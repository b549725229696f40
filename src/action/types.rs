use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a remote action, as assigned by the provider API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ActionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Lifecycle status reported by the API for an action.
///
/// `Success` and `Error` are terminal: once reported, the action never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Running,
    Success,
    Error,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionStatus::Success | ActionStatus::Error)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Running => write!(f, "running"),
            ActionStatus::Success => write!(f, "success"),
            ActionStatus::Error => write!(f, "error"),
        }
    }
}

/// Error payload attached to an action that finished with [`ActionStatus::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionErrorInfo {
    pub code: String,
    pub message: String,
}

/// A resource touched by an action (e.g. the server a backup was enabled for).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResource {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Snapshot of one remote action.
///
/// The tracker never patches a snapshot field by field; every poll replaces
/// the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    #[serde(default)]
    pub command: String,
    pub status: ActionStatus,
    /// Advisory completion percentage, 0..=100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resources: Vec<ActionResource>,
    #[serde(default)]
    pub error: Option<ActionErrorInfo>,
}

impl Action {
    /// A freshly started action with no progress yet.
    pub fn running(id: impl Into<ActionId>) -> Self {
        Self {
            id: id.into(),
            command: String::new(),
            status: ActionStatus::Running,
            progress: 0,
            started: None,
            finished: None,
            resources: Vec::new(),
            error: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    pub fn with_resource(mut self, id: u64, kind: impl Into<String>) -> Self {
        self.resources.push(ActionResource {
            id,
            kind: kind.into(),
        });
        self
    }

    /// Marks the snapshot as successfully finished.
    pub fn succeeded(mut self) -> Self {
        self.status = ActionStatus::Success;
        self.progress = 100;
        self.error = None;
        self
    }

    /// Marks the snapshot as failed with the given remote error.
    pub fn failed(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.status = ActionStatus::Error;
        self.error = Some(ActionErrorInfo {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Human-readable label, e.g. `enable_backup (server: 123)`.
    pub fn describe(&self) -> String {
        let command = if self.command.is_empty() {
            format!("action {}", self.id)
        } else {
            self.command.clone()
        };
        if self.resources.is_empty() {
            return command;
        }
        let resources: Vec<String> = self
            .resources
            .iter()
            .map(|r| format!("{}: {}", r.kind, r.id))
            .collect();
        format!("{command} ({})", resources.join(", "))
    }
}
