//! Edit → assignee → status → save inside a task-detail popup.
//!
//! Header (Edit/Save) and main (form fields) frames are resolved by content
//! whenever their conventional names are missing.

use crate::config::{ms, Timings};
use crate::errors::{AutomationError, TaskError};
use crate::locator::{find_frame, first_frame_matching, has_match, wait_for_selector, wait_for_visible, FrameQuery};
use crate::outcome::StatusChange;
use crate::platforms::{BrowsingContext, Frame, SelectBy};
use crate::selector::Selector;
use crate::settle::settle;
use crate::target;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// How form-step failures are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Log and keep going; every step is attempted.
    Lenient,
    /// The first failing step aborts the update so the caller can retry the task.
    Strict,
}

/// What the update did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailReport {
    pub status_change: Option<StatusChange>,
    /// Steps that failed in lenient mode, in order
    pub failures: Vec<TaskError>,
}

impl DetailReport {
    pub fn first_failure(&self) -> Option<&TaskError> {
        self.failures.first()
    }
}

/// Header frame: conventional name, else the first frame holding Edit or Save, else root.
pub async fn resolve_header_frame(
    context: &dyn BrowsingContext,
) -> Result<Arc<dyn Frame>, AutomationError> {
    resolve_frame(
        context,
        target::HEADER_FRAME_NAME,
        vec![target::edit_or_save_button()],
    )
    .await
}

/// Main frame: conventional name, else the first frame holding the assignee input or
/// status selector, else root.
pub async fn resolve_main_frame(
    context: &dyn BrowsingContext,
) -> Result<Arc<dyn Frame>, AutomationError> {
    resolve_frame(context, target::MAIN_FRAME_NAME, vec![target::form_fields()]).await
}

async fn resolve_frame(
    context: &dyn BrowsingContext,
    name: &str,
    content: Vec<Selector>,
) -> Result<Arc<dyn Frame>, AutomationError> {
    if let Some(frame) = first_frame_matching(context, &FrameQuery::Name(name.to_string())).await {
        return Ok(frame);
    }
    if let Some(frame) = first_frame_matching(context, &FrameQuery::HasAny(content)).await {
        debug!("'{}' resolved by content to frame '{}'", name, frame.name());
        return Ok(frame);
    }
    debug!("'{}' not found; using root frame", name);
    context.main_frame().await
}

/// Click a header control located by its visible label.
pub async fn click_header_button(
    frame: &dyn Frame,
    label: &str,
    timeout: Duration,
) -> Result<(), AutomationError> {
    let button = target::header_button(label);
    if !has_match(frame, &button).await {
        return Err(AutomationError::ElementNotFound(format!(
            "{label} button not found in frame '{}'",
            frame.name()
        )));
    }
    frame.click(&button, timeout).await
}

/// Choose an option by value, then by exact label, then by label substring.
pub async fn select_option_smart(
    frame: &dyn Frame,
    select: &Selector,
    value: &str,
    label: &str,
) -> Result<bool, AutomationError> {
    if !has_match(frame, select).await {
        return Err(AutomationError::ElementNotFound(format!(
            "Select not found: {select}"
        )));
    }
    if let Ok(true) = frame.select_option(select, &SelectBy::Value(value.to_string())).await {
        return Ok(true);
    }
    if let Ok(true) = frame.select_option(select, &SelectBy::Label(label.to_string())).await {
        return Ok(true);
    }
    let needle = label.to_lowercase();
    let state = frame.select_state(select).await?;
    match state
        .options
        .iter()
        .find(|option| option.label.to_lowercase().contains(&needle))
    {
        Some(option) => {
            frame
                .select_option(select, &SelectBy::Value(option.value.clone()))
                .await
        }
        None => Ok(false),
    }
}

/// Updates one task-detail popup.
pub struct DetailForm<'a> {
    context: &'a dyn BrowsingContext,
    assignee: &'a str,
    policy: Policy,
    timings: &'a Timings,
}

impl<'a> DetailForm<'a> {
    pub fn new(
        context: &'a dyn BrowsingContext,
        assignee: &'a str,
        policy: Policy,
        timings: &'a Timings,
    ) -> Self {
        Self {
            context,
            assignee,
            policy,
            timings,
        }
    }

    async fn settle(&self, timeout_ms: u64) {
        settle(self.context, ms(timeout_ms), self.timings).await;
    }

    /// Run Edit, assignee, status and Save according to the policy.
    #[instrument(level = "info", skip(self), fields(policy = ?self.policy))]
    pub async fn update(&self, task: &str) -> Result<DetailReport, TaskError> {
        match self.policy {
            Policy::Lenient => Ok(self.update_lenient(task).await),
            Policy::Strict => self.update_strict(task).await,
        }
    }

    async fn update_lenient(&self, task: &str) -> DetailReport {
        let mut report = DetailReport::default();
        let timings = self.timings;

        // Edit is optional: the record may already be in edit mode.
        match resolve_header_frame(self.context).await {
            Ok(header) => {
                match click_header_button(header.as_ref(), "Edit", ms(timings.header_click_ms)).await {
                    Ok(()) => {
                        self.settle(timings.after_edit_settle_ms).await;
                        self.wait_for_fields().await;
                    }
                    Err(e) => debug!("Task {}: Edit not clicked ({}); continuing", task, e),
                }
            }
            Err(e) => debug!("Task {}: no header frame: {}", task, e),
        }

        // Edit may have reloaded the form; resolve again.
        let main = match resolve_main_frame(self.context).await {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("Task {}: main frame unavailable: {}", task, e);
                None
            }
        };

        match &main {
            Some(frame) => {
                if let Err(e) = self.set_assignee(frame.as_ref()).await {
                    warn!("Task {}: assignee set error: {}", task, e);
                    report.failures.push(TaskError::AssigneeFailed(e.to_string()));
                }
                match self.set_status_if_pending(frame.as_ref()).await {
                    Ok(change) => report.status_change = Some(change),
                    Err(e) => {
                        warn!("Task {}: status set error: {}", task, e);
                        report.failures.push(TaskError::StatusFailed(e.to_string()));
                    }
                }
            }
            None => {
                report
                    .failures
                    .push(TaskError::AssigneeFailed("main frame unavailable".to_string()));
                report
                    .failures
                    .push(TaskError::StatusFailed("main frame unavailable".to_string()));
            }
        }

        let saved = match resolve_header_frame(self.context).await {
            Ok(header) => click_header_button(header.as_ref(), "Save", ms(timings.header_click_ms)).await,
            Err(e) => Err(e),
        };
        match saved {
            Ok(()) => self.settle(timings.after_save_settle_ms).await,
            Err(e) => {
                warn!("Task {}: save click error: {}", task, e);
                report.failures.push(TaskError::SaveNotClicked(e.to_string()));
            }
        }
        report
    }

    async fn update_strict(&self, task: &str) -> Result<DetailReport, TaskError> {
        let timings = self.timings;
        info!("Updating task {}", task);

        let edit_frame = self
            .click_across_frames(
                &target::header_button("Edit"),
                ms(timings.edit_scan_ms),
                Some(ms(timings.pre_click_pause_ms)),
            )
            .await
            .map_err(|e| TaskError::EditNotFound(e.to_string()))?;
        info!("Clicked Edit in frame '{}'", edit_frame);
        self.settle(timings.strict_after_edit_settle_ms).await;

        let main = find_frame(
            self.context,
            &FrameQuery::HasAny(vec![target::form_fields()]),
            ms(timings.main_frame_scan_ms),
            ms(timings.scan_poll_ms),
        )
        .await
        .ok_or_else(|| {
            TaskError::EditNotFound(
                "Could not find main frame with form fields (edit mode not active?)".to_string(),
            )
        })?;
        debug!("Form fields found in frame '{}'", main.name());

        wait_for_visible(
            main.as_ref(),
            &Selector::css(target::ASSIGNEE_INPUT),
            ms(timings.assignee_visible_ms),
            ms(timings.scan_poll_ms),
        )
        .await
        .map_err(|e| TaskError::AssigneeFailed(e.to_string()))?;
        self.set_assignee(main.as_ref())
            .await
            .map_err(|e| TaskError::AssigneeFailed(e.to_string()))?;

        let change = self
            .set_status_if_pending(main.as_ref())
            .await
            .map_err(|e| TaskError::StatusFailed(e.to_string()))?;

        let save_frame = self
            .click_across_frames(&target::header_button("Save"), ms(timings.save_scan_ms), None)
            .await
            .map_err(|e| TaskError::SaveNotClicked(e.to_string()))?;
        debug!("Clicked Save in frame '{}'", save_frame);
        self.settle(timings.after_save_settle_ms).await;

        Ok(DetailReport {
            status_change: Some(change),
            failures: Vec::new(),
        })
    }

    /// Best-effort wait for the form fields after Edit.
    async fn wait_for_fields(&self) {
        let Ok(main) = resolve_main_frame(self.context).await else {
            return;
        };
        for field in [target::ASSIGNEE_INPUT, target::STATUS_SELECT] {
            if let Err(e) = wait_for_selector(
                main.as_ref(),
                &Selector::css(field),
                ms(self.timings.field_wait_ms),
                ms(self.timings.frame_poll_ms),
            )
            .await
            {
                debug!("{}", e);
            }
        }
    }

    /// Focus, fill, Enter (the application's own auto-complete), blur.
    pub async fn set_assignee(&self, frame: &dyn Frame) -> Result<(), AutomationError> {
        let input = Selector::css(target::ASSIGNEE_INPUT);
        if !has_match(frame, &input).await {
            return Err(AutomationError::ElementNotFound(format!(
                "Assignee field not found in frame '{}'",
                frame.name()
            )));
        }
        if let Err(e) = frame.click(&input, ms(self.timings.field_click_ms)).await {
            debug!("Assignee focus click failed: {}", e);
        }
        frame.fill(&input, self.assignee).await?;
        if let Err(e) = frame.press(&input, "Enter").await {
            debug!("Enter on assignee failed: {}", e);
        }
        if let Err(e) = frame.blur(&input).await {
            debug!("Assignee blur failed: {}", e);
        }
        self.settle(self.timings.after_assignee_settle_ms).await;
        Ok(())
    }

    /// Pending → Complete; any other status is left untouched.
    pub async fn set_status_if_pending(
        &self,
        frame: &dyn Frame,
    ) -> Result<StatusChange, AutomationError> {
        let select = Selector::css(target::STATUS_SELECT);
        if !has_match(frame, &select).await {
            return Err(AutomationError::ElementNotFound(format!(
                "Status select not found in frame '{}'",
                frame.name()
            )));
        }
        let state = frame.select_state(&select).await?;
        if !target::is_pending(&state.value) && !target::is_pending(&state.label) {
            debug!("Status is '{}' ({}); leaving it", state.label, state.value);
            return Ok(StatusChange::Unchanged);
        }

        if !select_option_smart(frame, &select, target::COMPLETE_CODE, target::COMPLETE_LABEL).await? {
            return Err(AutomationError::InvalidArgument(
                "Could not set status to Complete".to_string(),
            ));
        }
        self.settle(self.timings.after_status_settle_ms).await;
        Ok(StatusChange::Completed)
    }

    /// Frames to scan for a control: the conventional main frame first, then the rest
    /// except the known-irrelevant one.
    async fn scan_order(&self) -> Vec<Arc<dyn Frame>> {
        let frames = self.context.frames().await.unwrap_or_default();
        let (mut first, rest): (Vec<_>, Vec<_>) = frames
            .into_iter()
            .filter(|f| f.name() != target::IGNORED_FRAME_NAME)
            .partition(|f| f.name() == target::MAIN_FRAME_NAME);
        first.extend(rest);
        first
    }

    /// Poll for a visible control in any frame and click it, falling back to a script
    /// click when the pointer click fails. Returns the frame name clicked in.
    async fn click_across_frames(
        &self,
        control: &Selector,
        scan: Duration,
        pause: Option<Duration>,
    ) -> Result<String, AutomationError> {
        let deadline = Instant::now() + scan;
        loop {
            for frame in self.scan_order().await {
                if !has_match(frame.as_ref(), control).await
                    || !matches!(frame.is_visible(control).await, Ok(true))
                {
                    continue;
                }
                debug!("Found {} in frame '{}'", control, frame.name());
                if let Some(pause) = pause {
                    tokio::time::sleep(pause).await;
                }
                match frame.click(control, ms(self.timings.header_click_ms)).await {
                    Ok(()) => return Ok(frame.name()),
                    Err(e) => {
                        warn!("Click in '{}' failed: {}; trying script click", frame.name(), e);
                        if frame.script_click(control).await.is_ok() {
                            return Ok(frame.name());
                        }
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::ElementNotFound(format!(
                    "Could not find or click {control}"
                )));
            }
            tokio::time::sleep(ms(self.timings.scan_poll_ms)).await;
        }
    }
}

/// Non-fatal check that the detail popup shows the expected heading.
pub async fn check_detail_title(context: &dyn BrowsingContext, task: &str) {
    match resolve_main_frame(context).await {
        Ok(main) => {
            if !has_match(main.as_ref(), &target::detail_title()).await {
                warn!("Task {}: expected title not found (continuing)", task);
            }
        }
        Err(e) => debug!("Task {}: title check skipped: {}", task, e),
    }
}
