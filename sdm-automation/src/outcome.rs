use serde::{Deserialize, Serialize};
use std::fmt;

/// Result label of one task in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Processed,
    AnchorNotFound,
    DetailPopupMissing,
    EditError,
    AssigneeError,
    StatusError,
    SaveError,
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Processed => "processed",
            TaskStatus::AnchorNotFound => "anchor_not_found",
            TaskStatus::DetailPopupMissing => "detail_popup_missing",
            TaskStatus::EditError => "edit_error",
            TaskStatus::AssigneeError => "assignee_error",
            TaskStatus::StatusError => "status_error",
            TaskStatus::SaveError => "save_error",
            TaskStatus::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// What the status step did to the task's status selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusChange {
    /// Was pending, now Complete.
    Completed,
    /// Was not pending; left untouched.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_change: Option<StatusChange>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl TaskOutcome {
    pub fn new(task: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            task: task.into(),
            status,
            status_change: None,
            message: None,
        }
    }

    pub fn processed(task: impl Into<String>, change: Option<StatusChange>) -> Self {
        Self {
            status_change: change,
            ..Self::new(task, TaskStatus::Processed)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_processed(&self) -> bool {
        self.status == TaskStatus::Processed
    }
}
