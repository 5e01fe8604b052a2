//! Single-ticket entry point.
//!
//! ```text
//! sdm-tasks 846349                 # type left as the page shows it, tasks 200 and 250
//! sdm-tasks 846349 go_in 300 310   # explicit type and tasks
//! ```
//!
//! Exit codes: 1 missing search text or other failure, 2 search UI unreachable,
//! 3 no ticket popup.

use clap::Parser;
use sdm_automation::utils::init_logging;
use sdm_automation::{
    target, Artifacts, AutomationConfig, AutomationError, ChromiumLauncher, Policy, ServiceDesk,
    TaskOutcome,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "sdm-tasks", author, version)]
#[command(about = "Assign and complete a ticket's workflow tasks in the service desk")]
struct Cli {
    /// Ticket number typed into the search box
    search_text: Option<String>,

    /// Ticket type selected next to the search box; untouched when omitted
    ticket_type: Option<String>,

    /// Workflow task numbers to process
    tasks: Vec<String>,

    /// Assignee display name ("Last, First")
    #[arg(long, env = "SDM_ASSIGNEE")]
    assignee: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Directory for the HTML/PNG audit files
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Skip writing audit files
    #[arg(long)]
    no_artifacts: bool,

    /// Print outcomes as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn ticket_type(&self) -> Option<&str> {
        self.ticket_type.as_deref().filter(|t| !t.is_empty())
    }

    fn tasks(&self) -> Vec<String> {
        if self.tasks.is_empty() {
            target::DEFAULT_TASKS.iter().map(|t| t.to_string()).collect()
        } else {
            self.tasks.clone()
        }
    }

    fn config(&self) -> AutomationConfig {
        let mut config = AutomationConfig::from_env();
        if self.headless {
            config.headless = true;
        }
        if let Some(assignee) = &self.assignee {
            config = config.with_assignee(assignee.clone());
        }
        config
    }
}

fn exit_code(err: &AutomationError) -> u8 {
    match err {
        AutomationError::SearchUnavailable(_) => 2,
        AutomationError::NoPopup(_) => 3,
        _ => 1,
    }
}

async fn run(cli: &Cli, search_text: &str) -> Result<Vec<TaskOutcome>, AutomationError> {
    let config = cli.config();
    let artifacts = (!cli.no_artifacts)
        .then(|| Artifacts::new(&cli.out_dir, search_text, config.timings.clone()));
    if let Some(artifacts) = &artifacts {
        info!("Audit files: {}_*", artifacts.base().display());
    }

    let service = ServiceDesk::launch(&ChromiumLauncher, config).await?;
    service.open_search().await;
    let result = service
        .run_ticket(
            search_text,
            cli.ticket_type(),
            &cli.tasks(),
            Policy::Lenient,
            artifacts.as_ref(),
        )
        .await;

    if let Err(e) = service.close().await {
        warn!("Closing browser failed: {}", e);
    }
    result
}

fn print_outcomes(outcomes: &[TaskOutcome], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
        return Ok(());
    }
    for outcome in outcomes {
        let change = outcome
            .status_change
            .map(|c| format!(" (status {c:?})").to_lowercase())
            .unwrap_or_default();
        match &outcome.message {
            Some(message) => println!("Task {}: {}{} - {}", outcome.task, outcome.status, change, message),
            None => println!("Task {}: {}{}", outcome.task, outcome.status, change),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging() {
        eprintln!("{e}");
    }

    let Some(search_text) = cli.search_text.as_deref().map(str::trim).filter(|s| !s.is_empty())
    else {
        eprintln!("Usage: sdm-tasks <searchText> [ticketType] [taskId ...]");
        return ExitCode::from(1);
    };

    match run(&cli, search_text).await {
        Ok(outcomes) => {
            if let Err(e) = print_outcomes(&outcomes, cli.json) {
                eprintln!("Failed to print outcomes: {e}");
                return ExitCode::from(1);
            }
            info!("Done with {}", search_text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {e}");
            ExitCode::from(exit_code(&e))
        }
    }
}
