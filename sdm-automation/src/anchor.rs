//! Resolves the clickable row of a workflow task.

use crate::config::{ms, Timings};
use crate::errors::AutomationError;
use crate::locator::has_match;
use crate::navigator::locate_workflow_frame;
use crate::platforms::{BrowsingContext, Frame};
use crate::selector::Selector;
use crate::target;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A located task link: the frame it lives in and a selector resolving to it.
#[derive(Debug, Clone)]
pub struct TaskAnchor {
    pub frame: Arc<dyn Frame>,
    pub selector: Selector,
}

/// How a task's detail popup gets opened.
#[derive(Debug, Clone)]
pub enum TaskOpener {
    /// Pointer click on the task link
    Click(TaskAnchor),
    /// Call the page's own row-open function with the row index taken from the link
    RowFunction { frame: Arc<dyn Frame>, row: u64 },
}

impl TaskOpener {
    /// Perform the opening action once. A click that fails falls back to the row-open
    /// function named by the link's href.
    pub async fn open(&self, click_timeout: Duration) -> Result<(), AutomationError> {
        match self {
            TaskOpener::Click(anchor) => {
                let Err(click_err) = anchor.frame.click(&anchor.selector, click_timeout).await else {
                    return Ok(());
                };
                let Some(row) = anchor.row().await else {
                    return Err(click_err);
                };
                warn!(
                    "Click on task link failed ({}); calling {}({})",
                    click_err,
                    target::ROW_OPEN_FUNCTION,
                    row
                );
                open_row(anchor.frame.as_ref(), row).await
            }
            TaskOpener::RowFunction { frame, row } => open_row(frame.as_ref(), *row).await,
        }
    }

    pub fn is_click(&self) -> bool {
        matches!(self, TaskOpener::Click(_))
    }
}

impl TaskAnchor {
    /// Row index from this link's `do_default(N)` href.
    pub async fn row(&self) -> Option<u64> {
        match self.frame.attribute(&self.selector, "href").await {
            Ok(href) => href.as_deref().and_then(parse_row_argument),
            Err(e) => {
                debug!("Reading task link href failed: {}", e);
                None
            }
        }
    }
}

async fn open_row(frame: &dyn Frame, row: u64) -> Result<(), AutomationError> {
    if call_row_function(frame, row).await? {
        Ok(())
    } else {
        Err(AutomationError::ElementNotFound(format!(
            "{}() is not defined in frame '{}'",
            target::ROW_OPEN_FUNCTION,
            frame.name()
        )))
    }
}

/// Strategies in priority order; each requires the trimmed label to equal `task`.
fn strategies(task: &str) -> [Selector; 3] {
    [
        Selector::exact_text(target::RECORD_ANCHOR, task),
        Selector::exact_text(target::GRID_FIRST_COLUMN_ANCHOR, task),
        Selector::exact_text(target::DO_DEFAULT_ANCHOR, task),
    ]
}

/// A link that exists but is not visible cannot be clicked and does not count.
async fn try_in_frame(frame: &Arc<dyn Frame>, task: &str) -> Option<TaskAnchor> {
    for selector in strategies(task) {
        if has_match(frame.as_ref(), &selector).await
            && matches!(frame.is_visible(&selector).await, Ok(true))
        {
            return Some(TaskAnchor {
                frame: frame.clone(),
                selector,
            });
        }
    }
    None
}

/// Find the task link: preferred frame (else the workflow frame), then every frame.
#[instrument(level = "debug", skip(context, preferred))]
pub async fn find_task_anchor(
    context: &dyn BrowsingContext,
    task: &str,
    preferred: Option<&Arc<dyn Frame>>,
) -> Option<TaskAnchor> {
    let first = match preferred {
        Some(frame) => Some(frame.clone()),
        None => locate_workflow_frame(context).await,
    };
    if let Some(frame) = &first {
        if let Some(hit) = try_in_frame(frame, task).await {
            return Some(hit);
        }
    }

    let frames = context.frames().await.ok()?;
    for frame in &frames {
        if let Some(hit) = try_in_frame(frame, task).await {
            return Some(hit);
        }
    }
    None
}

fn row_argument_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"do_default\((\d+)\)").expect("row argument pattern is valid")
    })
}

/// Row index passed to the row-open function by the task's link, parsed from its href.
pub fn parse_row_argument(href: &str) -> Option<u64> {
    row_argument_pattern()
        .captures(href)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Row index of the task's link in `frame`, visible or not, from any anchor markup
/// whose href calls the row-open function.
pub async fn row_index(frame: &dyn Frame, task: &str) -> Option<u64> {
    for selector in strategies(task) {
        match frame.attribute(&selector, "href").await {
            Ok(Some(href)) => {
                if let Some(row) = parse_row_argument(&href) {
                    return Some(row);
                }
            }
            Ok(None) => {}
            Err(e) => debug!("No row link for task {} in '{}': {}", task, frame.name(), e),
        }
    }
    None
}

async fn call_row_function(frame: &dyn Frame, row: u64) -> Result<bool, AutomationError> {
    frame
        .call_global(target::ROW_OPEN_FUNCTION, vec![serde_json::json!(row)])
        .await
}

/// Anchor resolution retried a few times, then the row-function escape hatch
/// (preferred frame first, then every frame).
#[instrument(level = "info", skip(context, preferred, timings))]
pub async fn resolve_task_opener(
    context: &dyn BrowsingContext,
    task: &str,
    preferred: Option<&Arc<dyn Frame>>,
    timings: &Timings,
) -> Option<TaskOpener> {
    let attempts = timings.anchor_attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(anchor) = find_task_anchor(context, task, preferred).await {
            debug!("Task {} anchor found in '{}'", task, anchor.frame.name());
            return Some(TaskOpener::Click(anchor));
        }
        if attempt < attempts {
            tokio::time::sleep(ms(timings.anchor_retry_ms)).await;
        }
    }

    warn!(
        "Task {}: no clickable anchor; trying {}() fallback",
        task,
        target::ROW_OPEN_FUNCTION
    );
    let mut candidates: Vec<Arc<dyn Frame>> = preferred.into_iter().cloned().collect();
    if let Ok(frames) = context.frames().await {
        candidates.extend(frames);
    }
    for frame in candidates {
        if let Some(row) = row_index(frame.as_ref(), task).await {
            info!("Task {} resolved to row {} in '{}'", task, row, frame.name());
            return Some(TaskOpener::RowFunction { frame, row });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_row_argument_from_href() {
        assert_eq!(parse_row_argument("javascript:do_default(3)"), Some(3));
        assert_eq!(parse_row_argument("javascript:do_default(12);void(0)"), Some(12));
        assert_eq!(parse_row_argument("javascript:do_default()"), None);
        assert_eq!(parse_row_argument("javascript:other(4)"), None);
    }

    #[test]
    fn every_strategy_requires_exact_label() {
        for selector in strategies("200") {
            assert!(selector.text_matches(" 200 "));
            assert!(!selector.text_matches("2000"));
            assert!(!selector.text_matches("20"));
        }
    }
}
