use thiserror::Error;

use crate::outcome::TaskStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Element is not visible: {0}")]
    ElementNotVisible(String),

    #[error("Browsing context is closed: {0}")]
    ContextClosed(String),

    #[error("Navigation in progress: {0}")]
    Navigating(String),

    #[error("Search UI not found: {0}")]
    SearchUnavailable(String),

    #[error("No popup detected: {0}")]
    NoPopup(String),

    #[error("Workflow Tasks tab failed: {0}")]
    WorkflowTab(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    /// True when the failure looks like the context was mid-navigation.
    pub fn is_navigation(&self) -> bool {
        match self {
            AutomationError::Navigating(_) => true,
            AutomationError::PlatformError(msg) | AutomationError::Internal(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("navigat") || lower.contains("execution context was destroyed")
            }
            _ => false,
        }
    }
}

/// Labeled failure of one task, surfaced to orchestrators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task link not found")]
    AnchorNotFound,

    #[error("Detail popup failed to open")]
    DetailPopupMissing,

    #[error("Edit failed: {0}")]
    EditNotFound(String),

    #[error("Assignee set error: {0}")]
    AssigneeFailed(String),

    #[error("Status set error: {0}")]
    StatusFailed(String),

    #[error("Save click error: {0}")]
    SaveNotClicked(String),
}

impl TaskError {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskError::AnchorNotFound => TaskStatus::AnchorNotFound,
            TaskError::DetailPopupMissing => TaskStatus::DetailPopupMissing,
            TaskError::EditNotFound(_) => TaskStatus::EditError,
            TaskError::AssigneeFailed(_) => TaskStatus::AssigneeError,
            TaskError::StatusFailed(_) => TaskStatus::StatusError,
            TaskError::SaveNotClicked(_) => TaskStatus::SaveError,
        }
    }
}
