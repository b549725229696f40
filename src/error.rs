use std::fmt;

use thiserror::Error;

use crate::action::{Action, ActionId};
use crate::api::ApiError;
use crate::context::StopReason;

/// One action that finished with status `error`.
///
/// This is an expected outcome of the remote operation, not a fault of the
/// waiter; the message is shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({code}, {action_id})")]
pub struct ActionFailed {
    pub action_id: ActionId,
    pub command: String,
    pub code: String,
    pub message: String,
}

impl ActionFailed {
    pub fn from_action(action: &Action) -> Self {
        let (code, message) = match &action.error {
            Some(err) => (err.code.clone(), err.message.clone()),
            None => ("unknown".to_string(), "action failed".to_string()),
        };
        Self {
            action_id: action.id,
            command: action.command.clone(),
            code,
            message,
        }
    }
}

/// Every failed action of one wait call, in the order the actions were passed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateActionFailure {
    pub failures: Vec<ActionFailed>,
}

impl AggregateActionFailure {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for AggregateActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failures.as_slice() {
            [single] => write!(f, "action failed: {single}"),
            failures => {
                write!(f, "{} actions failed: ", failures.len())?;
                for (i, failure) in failures.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{failure}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for AggregateActionFailure {}

/// Outcome of a wait that did not end with every action succeeding.
#[derive(Debug, Error)]
pub enum WaitError {
    /// All actions finished and at least one of them failed.
    #[error(transparent)]
    ActionsFailed(#[from] AggregateActionFailure),

    /// The wait was abandoned while some actions were still running.
    /// They keep running remotely; the IDs let the user check on them later.
    /// Actions that had already failed when the wait stopped are kept in
    /// `failures`, in input order.
    #[error("wait {reason} with actions still pending: {}", join_ids(.pending))]
    Incomplete {
        reason: StopReason,
        pending: Vec<ActionId>,
        failures: Vec<ActionFailed>,
    },

    /// The API kept answering without these actions.
    #[error("actions not returned by the API: {}", join_ids(.ids))]
    Unknown { ids: Vec<ActionId> },

    /// The status request itself failed after retries.
    #[error("failed to poll action status: {0}")]
    Transport(#[source] ApiError),
}

impl WaitError {
    /// Process exit code for the CLI: 2 for an incomplete wait, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            WaitError::Incomplete { .. } => 2,
            WaitError::ActionsFailed(_) | WaitError::Unknown { .. } | WaitError::Transport(_) => 1,
        }
    }
}

fn join_ids(ids: &[ActionId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
