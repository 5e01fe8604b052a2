//! Per-connection batch state. The operator picks tasks for each ticket; the session holds
//! the open ticket until a process or skip choice arrives.

use sdm_automation::config::ms;
use sdm_automation::{
    AutomationConfig, AutomationError, ServiceDesk, SessionLauncher, TaskOutcome, TaskStatus,
    Ticket,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::events::{ClientEvent, LogLevel, ServerEvent};

pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Loading,
    /// A ticket is loaded (or failed to load) and the operator has not chosen yet
    AwaitingSelection,
    Processing,
    Done,
}

pub struct BatchSession {
    launcher: Arc<dyn SessionLauncher>,
    config: AutomationConfig,
    desk: Option<ServiceDesk>,
    queue: Vec<String>,
    index: usize,
    ticket_type: String,
    ticket: Option<Ticket>,
    phase: BatchPhase,
    outbox: Outbox,
}

impl BatchSession {
    pub fn new(launcher: Arc<dyn SessionLauncher>, config: AutomationConfig, outbox: Outbox) -> Self {
        Self {
            launcher,
            config,
            desk: None,
            queue: Vec::new(),
            index: 0,
            ticket_type: sdm_automation::target::DEFAULT_TICKET_TYPE.to_string(),
            ticket: None,
            phase: BatchPhase::Idle,
            outbox,
        }
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    pub fn assignee(&self) -> &str {
        &self.config.assignee
    }

    pub fn queue(&self) -> &[String] {
        &self.queue
    }

    pub async fn handle(&mut self, event: ClientEvent) {
        debug!("Client event: {:?}", event);
        match event {
            ClientEvent::SetUser { first, last } => self.set_user(&first, &last),
            ClientEvent::UploadBatch(upload) => self.upload_batch(upload.into_tickets()).await,
            ClientEvent::StartBatch { ticket_type } => self.start_batch(ticket_type).await,
            ClientEvent::ProcessCurrentTicket(tasks) => self.process_current_ticket(tasks).await,
            ClientEvent::SkipCurrentTicket => self.skip_current_ticket().await,
        }
    }

    fn set_user(&mut self, first: &str, last: &str) {
        let (first, last) = (first.trim(), last.trim());
        if first.is_empty() || last.is_empty() {
            self.log(LogLevel::Error, "Both first and last name are required");
            return;
        }
        let assignee = format!("{last}, {first}");
        if let Some(desk) = self.desk.as_mut() {
            desk.set_assignee(assignee.clone());
        }
        self.config.assignee = assignee;
        self.log(
            LogLevel::Success,
            format!("Assignee set to: {}", self.config.assignee),
        );
    }

    async fn upload_batch(&mut self, tickets: Vec<String>) {
        self.close_ticket().await;
        self.queue = tickets;
        self.index = 0;
        self.phase = BatchPhase::Idle;
        if self.queue.is_empty() {
            self.log(LogLevel::Warn, "No valid ticket numbers found in upload");
        } else {
            self.log(
                LogLevel::Info,
                format!("Batch Uploaded: {} tickets loaded.", self.queue.len()),
            );
        }
    }

    async fn start_batch(&mut self, ticket_type: Option<String>) {
        if self.queue.is_empty() {
            self.log(LogLevel::Error, "No tickets uploaded");
            return;
        }
        if let Some(ticket_type) = ticket_type.filter(|t| !t.trim().is_empty()) {
            self.ticket_type = ticket_type.trim().to_string();
        }
        self.close_ticket().await;
        self.index = 0;
        self.log(
            LogLevel::Info,
            format!(
                "Starting batch of {} {} tickets as {}",
                self.queue.len(),
                self.ticket_type,
                self.config.assignee
            ),
        );
        self.load_next_ticket().await;
    }

    async fn process_current_ticket(&mut self, tasks: Vec<String>) {
        let Some(mut ticket) = self.ticket.take() else {
            self.log(LogLevel::Error, "No active ticket popup");
            return;
        };
        self.phase = BatchPhase::Processing;
        let number = ticket.number().to_string();
        self.log(
            LogLevel::Info,
            format!("Processing Tasks for Ticket {}: {}", number, tasks.join(", ")),
        );

        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in &tasks {
            if let Some(reason) = ticket.skip_reason(task).await {
                self.log(LogLevel::Warn, format!("Skipping Task {task}: {reason}"));
                outcomes.push(TaskOutcome::new(task.as_str(), TaskStatus::Skipped).with_message(reason));
                continue;
            }

            self.log(LogLevel::Info, format!("Starting Task {task}..."));
            let outcome = ticket.process_task_with_retry(task, None).await;
            if outcome.is_processed() {
                self.log(LogLevel::Success, format!("Task {task} Completed!"));
            } else {
                self.log(
                    LogLevel::Error,
                    format!(
                        "Task {} failed ({}): {}",
                        task,
                        outcome.status,
                        outcome.message.as_deref().unwrap_or("no details")
                    ),
                );
            }
            outcomes.push(outcome);
            tokio::time::sleep(ms(self.config.timings.between_tasks_ms)).await;
        }

        let processed = outcomes.iter().filter(|o| o.is_processed()).count();
        let skipped = outcomes
            .iter()
            .filter(|o| o.status == TaskStatus::Skipped)
            .count();
        info!(
            "Ticket {}: {} processed, {} skipped, {} failed",
            number,
            processed,
            skipped,
            outcomes.len() - processed - skipped
        );

        self.log(LogLevel::Info, format!("Closing Ticket {number}..."));
        ticket.close().await;

        self.index += 1;
        self.load_next_ticket().await;
    }

    async fn skip_current_ticket(&mut self) {
        if self.phase != BatchPhase::AwaitingSelection {
            self.log(LogLevel::Warn, "No ticket to skip");
            return;
        }
        let number = self.queue.get(self.index).cloned().unwrap_or_default();
        self.log(
            LogLevel::Warn,
            format!("Skipping Ticket {number} by user request."),
        );
        self.close_ticket().await;
        self.index += 1;
        self.load_next_ticket().await;
    }

    async fn load_next_ticket(&mut self) {
        let Some(number) = self.queue.get(self.index).cloned() else {
            self.phase = BatchPhase::Done;
            self.log(LogLevel::Success, "Batch Processing Complete!");
            self.emit(ServerEvent::BatchComplete);
            return;
        };

        self.phase = BatchPhase::Loading;
        self.log(LogLevel::Info, "----------------------------------------");
        self.log(
            LogLevel::Info,
            format!(
                "Loading Ticket {}/{}: {}",
                self.index + 1,
                self.queue.len(),
                number
            ),
        );
        self.emit(ServerEvent::LoadingTicket);

        let (ticket_num, tasks) = match self.open_ticket(&number).await {
            Ok(ticket) => {
                let tasks = ticket.discover_tasks().await;
                if tasks.is_empty() {
                    self.log(LogLevel::Warn, "No tasks found automatically.");
                }
                self.ticket = Some(ticket);
                (number.clone(), tasks)
            }
            Err(e) => {
                self.log(
                    LogLevel::Error,
                    format!("Failed to load Ticket {number}: {e}"),
                );
                (format!("{number} (LOAD FAILED)"), Vec::new())
            }
        };

        self.phase = BatchPhase::AwaitingSelection;
        self.emit(ServerEvent::TicketReady {
            index: self.index,
            total: self.queue.len(),
            ticket_num,
            tasks,
        });
        if self.ticket.is_some() {
            self.log(
                LogLevel::Success,
                format!("Ticket {number} Ready. Waiting for user selection..."),
            );
        }
    }

    /// Launch the browser on first use, then search for `number`.
    async fn open_ticket(&mut self, number: &str) -> Result<Ticket, AutomationError> {
        let desk = match self.desk.take() {
            Some(desk) => desk,
            None => {
                self.log(LogLevel::Info, "Launching Browser...");
                let desk = ServiceDesk::launch(self.launcher.as_ref(), self.config.clone()).await?;
                self.log(
                    LogLevel::Info,
                    format!("Navigating to {}", self.config.base_url),
                );
                desk.open_search().await;
                self.log(LogLevel::Success, "Service desk loaded. Ready for batch.");
                desk
            }
        };
        let result = desk.open_ticket(number, Some(&self.ticket_type)).await;
        self.desk = Some(desk);
        result
    }

    async fn close_ticket(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            ticket.close().await;
        }
    }

    /// Release the open ticket and the browser.
    pub async fn shutdown(&mut self) {
        self.close_ticket().await;
        if let Some(desk) = self.desk.take() {
            info!("Closing browser");
            if let Err(e) = desk.close().await {
                warn!("Closing browser failed: {}", e);
            }
        }
        self.phase = BatchPhase::Idle;
    }

    /// Log locally and mirror the line to the operator.
    pub fn log(&self, level: LogLevel, msg: impl Into<String>) {
        let msg = msg.into();
        match level {
            LogLevel::Info | LogLevel::Success => info!("{}", msg),
            LogLevel::Warn => warn!("{}", msg),
            LogLevel::Error => error!("{}", msg),
        }
        self.emit(ServerEvent::Log { level, msg });
    }

    fn emit(&self, event: ServerEvent) {
        if self.outbox.send(event).is_err() {
            debug!("Client gone; event dropped");
        }
    }
}
