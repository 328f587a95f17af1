//! Action model ⇄ native `Exec` action

use crate::models::Action;
use crate::native::ExecAction;
use tracing::{debug, warn};

/// Command registered when a task has no runnable action
pub const PLACEHOLDER_COMMAND: &str = "cmd.exe";
pub const PLACEHOLDER_ARGUMENTS: &str = "/c exit 0";

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn to_native(action: &Action) -> ExecAction {
    ExecAction {
        command: action.command.trim().to_string(),
        arguments: non_empty(&action.arguments),
        working_directory: non_empty(&action.working_directory),
    }
}

pub fn from_native(exec: &ExecAction) -> Action {
    Action {
        command: exec.command.clone(),
        arguments: exec.arguments.clone().unwrap_or_default(),
        working_directory: exec.working_directory.clone().unwrap_or_default(),
    }
}

pub fn placeholder() -> ExecAction {
    ExecAction {
        command: PLACEHOLDER_COMMAND.to_string(),
        arguments: Some(PLACEHOLDER_ARGUMENTS.to_string()),
        working_directory: None,
    }
}

/// Encode in order, dropping actions without a command. The result is never
/// empty.
pub fn encode_actions(actions: &[Action]) -> Vec<ExecAction> {
    let mut encoded: Vec<ExecAction> = actions
        .iter()
        .filter(|a| {
            let blank = a.command.trim().is_empty();
            if blank {
                debug!("Dropping action without a command");
            }
            !blank
        })
        .map(to_native)
        .collect();

    if encoded.is_empty() {
        warn!("Task has no runnable action, registering placeholder {}", PLACEHOLDER_COMMAND);
        encoded.push(placeholder());
    }
    encoded
}

pub fn decode_actions(actions: &[ExecAction]) -> Vec<Action> {
    actions.iter().map(from_native).collect()
}
