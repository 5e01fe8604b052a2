//! Search → ticket popup → workflow tasks → per-task detail updates.

use crate::anchor::resolve_task_opener;
use crate::config::{ms, AutomationConfig};
use crate::detail::{check_detail_title, DetailForm, DetailReport, Policy};
use crate::diagnostics::{Artifacts, Phase};
use crate::errors::{AutomationError, TaskError};
use crate::locator::{find_frame_with_selectors, has_match};
use crate::navigator::{discover_tasks, open_workflow_tab, row_status};
use crate::outcome::{TaskOutcome, TaskStatus};
use crate::platforms::{BrowserSession, BrowsingContext, Frame, LoadState, SelectBy, SessionLauncher};
use crate::popup::run_and_catch_popup;
use crate::selector::Selector;
use crate::settle::settle;
use crate::target;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A browser session driving the service desk from its home page.
pub struct ServiceDesk {
    session: Arc<dyn BrowserSession>,
    page: Arc<dyn BrowsingContext>,
    config: AutomationConfig,
}

impl ServiceDesk {
    /// Launch a browser and open a blank top-level context.
    pub async fn launch(
        launcher: &dyn SessionLauncher,
        config: AutomationConfig,
    ) -> Result<Self, AutomationError> {
        info!(headless = config.headless, "Launching browser");
        let session = launcher.launch(&config).await?;
        let page = match session.new_context().await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    debug!("Closing half-launched session failed: {}", close_err);
                }
                return Err(e);
            }
        };
        Ok(Self {
            session,
            page,
            config,
        })
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    pub fn set_assignee(&mut self, assignee: impl Into<String>) {
        self.config.assignee = assignee.into();
    }

    pub fn session(&self) -> &Arc<dyn BrowserSession> {
        &self.session
    }

    pub fn page(&self) -> &Arc<dyn BrowsingContext> {
        &self.page
    }

    /// Navigate to the base URL; navigation errors are tolerated.
    #[instrument(level = "info", skip(self), fields(url = %self.config.base_url))]
    pub async fn open_search(&self) {
        let timings = &self.config.timings;
        info!("Navigating to {}", self.config.base_url);
        if let Err(e) = self.page.goto(&self.config.base_url).await {
            warn!("Navigation reported an error (continuing): {}", e);
        }
        if let Err(e) = self
            .page
            .wait_for_load_state(LoadState::Load, ms(timings.navigation_load_ms))
            .await
        {
            debug!("Home page still loading: {}", e);
        }
        settle(self.page.as_ref(), ms(timings.navigation_settle_ms), timings).await;
    }

    /// Search for a ticket, catch its popup and open the Workflow Tasks list.
    #[instrument(level = "info", skip(self))]
    pub async fn open_ticket(
        &self,
        search_text: &str,
        ticket_type: Option<&str>,
    ) -> Result<Ticket, AutomationError> {
        let timings = &self.config.timings;
        let search_input = Selector::css(target::SEARCH_INPUT);
        let go = Selector::css(target::GO_BUTTON);

        let search_frame = find_frame_with_selectors(
            self.page.as_ref(),
            &[search_input.clone(), go.clone()],
            ms(timings.search_frame_ms),
            ms(timings.frame_poll_ms),
        )
        .await
        .ok_or_else(|| {
            AutomationError::SearchUnavailable("Search UI not found in any frame".to_string())
        })?;
        info!("Search UI found in frame '{}'", search_frame.name());

        search_frame.fill(&search_input, "").await?;
        search_frame.fill(&search_input, search_text).await?;

        if let Some(ticket_type) = ticket_type.filter(|t| !t.is_empty()) {
            let select = Selector::css(target::TICKET_TYPE_SELECT);
            if has_match(search_frame.as_ref(), &select).await {
                if let Err(e) = search_frame
                    .select_option(&select, &SelectBy::Value(ticket_type.to_string()))
                    .await
                {
                    debug!("Ticket type not selected: {}", e);
                }
            }
        }

        info!("Clicking Go");
        let click_go = async {
            if let Err(e) = search_frame.click(&go, ms(timings.tab_click_ms)).await {
                warn!("Go click failed: {}", e);
            }
        };
        let popup = run_and_catch_popup(
            self.session.as_ref(),
            &self.page,
            click_go,
            ms(timings.popup_timeout_ms),
            timings,
        )
        .await
        .ok_or_else(|| AutomationError::NoPopup("No popup detected after Go".to_string()))?;

        if let Err(e) = popup.bring_to_front().await {
            debug!("bring_to_front failed: {}", e);
        }
        settle(popup.as_ref(), ms(timings.ticket_popup_settle_ms), timings).await;

        let workflow_frame = match open_workflow_tab(popup.as_ref(), timings).await {
            Ok(frame) => frame,
            Err(e) => {
                if let Err(close_err) = popup.close().await {
                    debug!("Closing ticket popup failed: {}", close_err);
                }
                return Err(e);
            }
        };

        Ok(Ticket {
            number: search_text.to_string(),
            session: self.session.clone(),
            popup,
            workflow_frame,
            config: self.config.clone(),
            detail: None,
        })
    }

    /// Open one ticket and process `tasks` in order.
    pub async fn run_ticket(
        &self,
        search_text: &str,
        ticket_type: Option<&str>,
        tasks: &[String],
        policy: Policy,
        artifacts: Option<&Artifacts>,
    ) -> Result<Vec<TaskOutcome>, AutomationError> {
        let mut ticket = self.open_ticket(search_text, ticket_type).await?;
        if let Some(artifacts) = artifacts {
            artifacts.dump_page(ticket.popup().as_ref(), "Popup").await;
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            let outcome = match policy {
                Policy::Lenient => ticket.process_task(task, policy, artifacts).await,
                Policy::Strict => ticket.process_task_with_retry(task, artifacts).await,
            };
            outcomes.push(outcome);
        }
        ticket.close().await;
        Ok(outcomes)
    }

    pub async fn close(&self) -> Result<(), AutomationError> {
        self.session.close().await
    }
}

/// An open ticket popup with its Workflow Tasks list loaded.
///
/// At most one task-detail popup is open at a time: every method that opens one takes
/// `&mut self` and closes the previous detail first.
pub struct Ticket {
    number: String,
    session: Arc<dyn BrowserSession>,
    popup: Arc<dyn BrowsingContext>,
    workflow_frame: Arc<dyn Frame>,
    config: AutomationConfig,
    detail: Option<Arc<dyn BrowsingContext>>,
}

impl Ticket {
    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn popup(&self) -> &Arc<dyn BrowsingContext> {
        &self.popup
    }

    pub fn workflow_frame(&self) -> &Arc<dyn Frame> {
        &self.workflow_frame
    }

    pub async fn discover_tasks(&self) -> Vec<String> {
        match discover_tasks(self.workflow_frame.as_ref()).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("Task discovery failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Reason to skip `task` when its row shows a status other than PENDING.
    pub async fn skip_reason(&self, task: &str) -> Option<String> {
        let status = row_status(self.workflow_frame.as_ref(), task).await?;
        if status.eq_ignore_ascii_case("PENDING") {
            None
        } else {
            Some(format!("Status is {status}"))
        }
    }

    async fn close_detail(&mut self) {
        if let Some(detail) = self.detail.take() {
            if let Err(e) = detail.close().await {
                debug!("Closing detail popup failed: {}", e);
            }
        }
    }

    /// One pass of anchor → detail popup → form update. The detail popup is closed
    /// before returning.
    async fn attempt(
        &mut self,
        task: &str,
        policy: Policy,
        artifacts: Option<&Artifacts>,
    ) -> Result<DetailReport, TaskError> {
        let timings = self.config.timings.clone();
        self.close_detail().await;

        let opener = resolve_task_opener(
            self.popup.as_ref(),
            task,
            Some(&self.workflow_frame),
            &timings,
        )
        .await
        .ok_or(TaskError::AnchorNotFound)?;

        let open = async {
            if let Err(e) = opener.open(ms(timings.tab_click_ms)).await {
                warn!("Task {}: opening the row failed: {}", task, e);
            }
        };
        let detail = run_and_catch_popup(
            self.session.as_ref(),
            &self.popup,
            open,
            ms(timings.detail_popup_timeout_ms),
            &timings,
        )
        .await
        .ok_or(TaskError::DetailPopupMissing)?;
        self.detail = Some(detail.clone());

        settle(detail.as_ref(), ms(timings.detail_settle_ms), &timings).await;
        check_detail_title(detail.as_ref(), task).await;

        if let Some(artifacts) = artifacts {
            artifacts.task_snapshot(detail.as_ref(), task, Phase::Before).await;
        }
        let result = DetailForm::new(detail.as_ref(), &self.config.assignee, policy, &timings)
            .update(task)
            .await;
        if let Some(artifacts) = artifacts {
            artifacts.task_snapshot(detail.as_ref(), task, Phase::After).await;
        }

        self.close_detail().await;
        result
    }

    /// Process one task once. In lenient mode the first failed form step becomes the
    /// outcome status even though later steps still ran.
    #[instrument(level = "info", skip(self, artifacts), fields(ticket = %self.number))]
    pub async fn process_task(
        &mut self,
        task: &str,
        policy: Policy,
        artifacts: Option<&Artifacts>,
    ) -> TaskOutcome {
        let outcome = match self.attempt(task, policy, artifacts).await {
            Ok(report) => report_outcome(task, report),
            Err(e) => TaskOutcome::new(task, e.status()).with_message(e.to_string()),
        };
        log_outcome(&outcome);
        outcome
    }

    /// Strict processing, retrying the whole task; partially opened detail popups are
    /// closed between attempts.
    #[instrument(level = "info", skip(self, artifacts), fields(ticket = %self.number))]
    pub async fn process_task_with_retry(
        &mut self,
        task: &str,
        artifacts: Option<&Artifacts>,
    ) -> TaskOutcome {
        let attempts = self.config.timings.task_attempts.max(1);
        let mut last_error = TaskError::AnchorNotFound;
        for attempt in 1..=attempts {
            match self.attempt(task, Policy::Strict, artifacts).await {
                Ok(report) => {
                    let outcome = report_outcome(task, report);
                    log_outcome(&outcome);
                    return outcome;
                }
                Err(e) => {
                    warn!("Task {}: attempt {}/{} failed: {}", task, attempt, attempts, e);
                    self.close_detail().await;
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(ms(self.config.timings.task_retry_pause_ms)).await;
                    }
                }
            }
        }
        let outcome = TaskOutcome::new(task, last_error.status()).with_message(last_error.to_string());
        log_outcome(&outcome);
        outcome
    }

    /// Close any detail popup and the ticket popup itself.
    pub async fn close(mut self) {
        self.close_detail().await;
        info!("Closing ticket {}", self.number);
        if let Err(e) = self.popup.close().await {
            debug!("Closing ticket popup failed: {}", e);
        }
    }
}

fn report_outcome(task: &str, report: DetailReport) -> TaskOutcome {
    match report.first_failure() {
        Some(failure) => TaskOutcome {
            status_change: report.status_change,
            ..TaskOutcome::new(task, failure.status()).with_message(failure.to_string())
        },
        None => TaskOutcome::processed(task, report.status_change),
    }
}

fn log_outcome(outcome: &TaskOutcome) {
    match outcome.status {
        TaskStatus::Processed => info!(
            "Task {} processed (status {:?})",
            outcome.task, outcome.status_change
        ),
        status => warn!(
            "Task {} finished with {}: {}",
            outcome.task,
            status,
            outcome.message.as_deref().unwrap_or("")
        ),
    }
}
