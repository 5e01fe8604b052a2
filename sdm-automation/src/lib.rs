//! Browser automation of a service-desk application's workflow tasks.
//!
//! The application's frames, popups and control ids are unstable, so every element is
//! located by searching the live frame tree: a ticket is searched, its result popup is
//! caught, the Workflow Tasks tab is opened and each requested task's detail popup gets
//! its assignee set and, when pending, its status completed.

pub mod anchor;
pub mod browser_script;
pub mod config;
pub mod detail;
pub mod diagnostics;
pub mod errors;
pub mod ingest;
pub mod locator;
pub mod navigator;
pub mod orchestrator;
pub mod outcome;
pub mod platforms;
pub mod popup;
pub mod selector;
pub mod settle;
pub mod target;
#[cfg(test)]
mod tests;
pub mod utils;

pub use anchor::{find_task_anchor, resolve_task_opener, TaskAnchor, TaskOpener};
pub use config::{AutomationConfig, Timings, Viewport};
pub use detail::{resolve_header_frame, resolve_main_frame, DetailForm, DetailReport, Policy};
pub use diagnostics::{Artifacts, Phase};
pub use errors::{AutomationError, TaskError};
pub use ingest::parse_ticket_lines;
pub use locator::{find_frame, find_frame_with_selectors, FrameQuery};
pub use navigator::{discover_tasks, open_workflow_tab};
pub use orchestrator::{ServiceDesk, Ticket};
pub use outcome::{StatusChange, TaskOutcome, TaskStatus};
pub use platforms::{
    BrowserSession, BrowsingContext, ChromiumLauncher, ContextStream, Frame, LoadState, SelectBy,
    SelectOption, SelectState, SessionLauncher,
};
pub use popup::run_and_catch_popup;
pub use selector::Selector;
pub use settle::settle;
