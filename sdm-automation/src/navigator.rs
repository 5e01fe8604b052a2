//! Drives a ticket popup to its Workflow Tasks list.

use crate::config::{ms, Timings};
use crate::errors::AutomationError;
use crate::locator::{find_frame, first_frame_matching, has_match, wait_for_selector, FrameQuery};
use crate::platforms::{BrowsingContext, Frame, LoadState};
use crate::selector::Selector;
use crate::settle::settle;
use crate::target;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Expand the accordion, activate the Workflow Tasks tab and return the task-list iframe.
///
/// Each attempt restarts from a settle of the popup; exhausting the attempts is fatal
/// for the ticket.
#[instrument(level = "info", skip_all, fields(popup = %popup.id()))]
pub async fn open_workflow_tab(
    popup: &dyn BrowsingContext,
    timings: &Timings,
) -> Result<Arc<dyn Frame>, AutomationError> {
    let attempts = timings.tab_attempts.max(1);
    let mut settle_for = ms(timings.tab_settle_before_ms);
    let mut last_error = None;

    for attempt in 1..=attempts {
        settle(popup, settle_for, timings).await;
        match try_open_workflow_tab(popup, timings).await {
            Ok(frame) => {
                info!("Workflow Tasks frame ready: '{}'", frame.name());
                return Ok(frame);
            }
            Err(e) => {
                warn!("Workflow Tasks attempt {}/{} failed: {}", attempt, attempts, e);
                last_error = Some(e);
                settle_for = ms(timings.tab_retry_settle_ms);
            }
        }
    }

    Err(AutomationError::WorkflowTab(
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Failed to open Workflow Tasks tab".to_string()),
    ))
}

async fn try_open_workflow_tab(
    popup: &dyn BrowsingContext,
    timings: &Timings,
) -> Result<Arc<dyn Frame>, AutomationError> {
    let search = ms(timings.tab_frame_search_ms);
    let poll = ms(timings.tab_frame_poll_ms);

    let by_accordion = FrameQuery::HasAll(vec![Selector::css(target::ACCORDION_ID)]);
    let by_tab = FrameQuery::HasAll(vec![Selector::css(target::WORKFLOW_TAB_ID)]);
    let frame = match find_frame(popup, &by_accordion, search, poll).await {
        Some(frame) => frame,
        None => match find_frame(popup, &by_tab, search, poll).await {
            Some(frame) => frame,
            None => popup.main_frame().await?,
        },
    };
    debug!("Tab controls expected in frame '{}'", frame.name());

    expand_accordion(popup, frame.as_ref(), timings).await;
    activate_tab(frame.as_ref(), timings).await?;
    settle(popup, ms(timings.tab_settle_after_click_ms), timings).await;

    let wf_frame = workflow_frame(popup, timings).await.ok_or_else(|| {
        AutomationError::WorkflowTab(format!(
            "Workflow Tasks iframe not found/loaded ({})",
            target::WORKFLOW_FRAME_NAME
        ))
    })?;

    if let Err(e) = wait_for_selector(
        wf_frame.as_ref(),
        &target::task_anchors(),
        ms(timings.task_rows_ms),
        ms(timings.frame_poll_ms),
    )
    .await
    {
        debug!("No task rows yet: {}", e);
    }
    Ok(wf_frame)
}

/// Clicking an expanded accordion collapses it, so a visible tab means "leave it".
async fn expand_accordion(popup: &dyn BrowsingContext, frame: &dyn Frame, timings: &Timings) {
    let tab = Selector::any([Selector::css(target::WORKFLOW_TAB), target::workflow_tab_by_text()]);
    if matches!(frame.is_visible(&tab).await, Ok(true)) {
        debug!("Accordion already expanded");
        return;
    }

    let by_id = Selector::css(target::ACCORDION);
    let by_text = target::accordion_by_text();
    let accordion = if has_match(frame, &by_id).await {
        by_id
    } else if has_match(frame, &by_text).await {
        by_text
    } else {
        debug!("No accordion present");
        return;
    };

    if let Err(e) = frame.click(&accordion, ms(timings.tab_click_ms)).await {
        debug!("Accordion click failed: {}", e);
    }
    settle(popup, ms(timings.tab_settle_after_click_ms), timings).await;
}

async fn activate_tab(frame: &dyn Frame, timings: &Timings) -> Result<(), AutomationError> {
    let by_id = Selector::css(target::WORKFLOW_TAB);
    if has_match(frame, &by_id).await {
        let class = frame.attribute(&by_id, "class").await?.unwrap_or_default();
        if class.contains(target::ACTIVE_TAB_CLASS) {
            debug!("Workflow Tasks tab already active");
            return Ok(());
        }
        return frame.click(&by_id, ms(timings.tab_click_ms)).await;
    }

    // Generated ids are not stable across tickets; fall back to the label.
    let by_text = target::workflow_tab_by_text();
    if !has_match(frame, &by_text).await {
        return Err(AutomationError::WorkflowTab(
            "Workflow Tasks tab not found".to_string(),
        ));
    }
    frame.click(&by_text, ms(timings.tab_click_ms)).await
}

/// Single pass: the task-list iframe by conventional name, else by URL marker.
pub async fn locate_workflow_frame(popup: &dyn BrowsingContext) -> Option<Arc<dyn Frame>> {
    let by_name = FrameQuery::Name(target::WORKFLOW_FRAME_NAME.to_string());
    if let Some(frame) = first_frame_matching(popup, &by_name).await {
        return Some(frame);
    }
    let by_url = FrameQuery::UrlContains(target::WORKFLOW_FRAME_URL_MARKER.to_string());
    first_frame_matching(popup, &by_url).await
}

/// Poll for the task-list iframe and give it a moment to load its document.
pub async fn workflow_frame(
    popup: &dyn BrowsingContext,
    timings: &Timings,
) -> Option<Arc<dyn Frame>> {
    let deadline = Instant::now() + ms(timings.workflow_frame_ms);
    loop {
        if let Some(frame) = locate_workflow_frame(popup).await {
            if let Err(e) = frame
                .wait_for_load_state(
                    LoadState::DomContentLoaded,
                    ms(timings.workflow_frame_load_ms),
                )
                .await
            {
                debug!("Workflow frame still loading: {}", e);
            }
            return Some(frame);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(ms(timings.frame_poll_ms)).await;
    }
}

/// Numeric labels of every task row, de-duplicated and in numeric order.
pub async fn discover_tasks(frame: &dyn Frame) -> Result<Vec<String>, AutomationError> {
    let labels = frame.texts(&target::task_anchors()).await?;
    let unique: BTreeSet<String> = labels
        .into_iter()
        .filter(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_digit()))
        .collect();
    let mut tasks: Vec<String> = unique.into_iter().collect();
    tasks.sort_by_key(|task| (task.parse::<u64>().unwrap_or(u64::MAX), task.clone()));
    Ok(tasks)
}

/// Status label shown in the task's row, when the row has one.
pub async fn row_status(frame: &dyn Frame, task: &str) -> Option<String> {
    let cells = frame
        .row_cells(&target::task_anchor_labelled(task))
        .await
        .ok()?;
    cells
        .get(target::ROW_STATUS_COLUMN)
        .map(|cell| cell.trim().to_string())
        .filter(|cell| !cell.is_empty())
}
