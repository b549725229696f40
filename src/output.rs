use serde::Serialize;

use cloudwait::action::{Action, ActionId};
use cloudwait::error::{ActionFailed, WaitError};

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Render rows under aligned headers, two spaces between columns.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let format_row = |cells: Vec<String>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{cell:w$}")
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![format_row(headers.iter().map(ToString::to_string).collect())];
    for row in rows {
        lines.push(format_row(row.clone()));
    }
    lines.join("\n")
}

pub fn action_rows(actions: &[Action]) -> Vec<Vec<String>> {
    actions
        .iter()
        .map(|a| {
            let resources = a
                .resources
                .iter()
                .map(|r| format!("{}: {}", r.kind, r.id))
                .collect::<Vec<_>>()
                .join(", ");
            vec![
                a.id.to_string(),
                a.command.clone(),
                a.status.to_string(),
                format!("{}%", a.progress),
                resources,
            ]
        })
        .collect()
}

/// Machine-readable summary of one wait.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WaitReport {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<ActionId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown: Vec<ActionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FailureEntry {
    pub id: ActionId,
    pub command: String,
    pub code: String,
    pub message: String,
}

impl From<&ActionFailed> for FailureEntry {
    fn from(f: &ActionFailed) -> Self {
        Self {
            id: f.action_id,
            command: f.command.clone(),
            code: f.code.clone(),
            message: f.message.clone(),
        }
    }
}

impl WaitReport {
    pub fn from_result(result: &Result<(), WaitError>) -> Self {
        let empty = Self {
            status: "success",
            failures: Vec::new(),
            pending: Vec::new(),
            unknown: Vec::new(),
            message: None,
        };
        match result {
            Ok(()) => empty,
            Err(WaitError::ActionsFailed(agg)) => Self {
                status: "failed",
                failures: agg.failures.iter().map(FailureEntry::from).collect(),
                ..empty
            },
            Err(WaitError::Incomplete {
                reason,
                pending,
                failures,
            }) => Self {
                status: "incomplete",
                failures: failures.iter().map(FailureEntry::from).collect(),
                pending: pending.clone(),
                message: Some(reason.to_string()),
                ..empty
            },
            Err(err @ WaitError::Unknown { ids }) => Self {
                status: "unknown",
                unknown: ids.clone(),
                message: Some(err.to_string()),
                ..empty
            },
            Err(err @ WaitError::Transport(_)) => Self {
                status: "error",
                message: Some(err.to_string()),
                ..empty
            },
        }
    }
}

/// Lines printed to stderr for a failed wait: one per failed action, then a
/// summary for pending or unknown IDs, or the transport error.
pub fn failure_lines(err: &WaitError) -> Vec<String> {
    match err {
        WaitError::ActionsFailed(agg) => agg.failures.iter().map(failure_line).collect(),
        WaitError::Incomplete {
            reason,
            pending,
            failures,
        } => {
            let ids = join_ids(pending);
            let mut lines: Vec<String> = failures.iter().map(failure_line).collect();
            lines.push(format!(
                "stopped waiting ({reason}); still running: {ids}. Check again with `cloudwait status {}`",
                ids.replace(", ", " ")
            ));
            lines
        }
        WaitError::Unknown { ids } => {
            vec![format!("the API does not know these actions: {}", join_ids(ids))]
        }
        WaitError::Transport(_) => vec![format!("operation failed: {err}")],
    }
}

fn failure_line(f: &ActionFailed) -> String {
    let what = if f.command.is_empty() {
        format!("action {}", f.action_id)
    } else {
        format!("action {} ({})", f.action_id, f.command)
    };
    format!("{what} failed: {} ({})", f.message, f.code)
}

fn join_ids(ids: &[ActionId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
