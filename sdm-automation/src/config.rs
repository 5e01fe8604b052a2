use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

use crate::target;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1400,
            height: 900,
        }
    }
}

/// Every wait bound used by the automation, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    // settle
    pub settle_load_state_ms: u64,
    pub settle_poll_ms: u64,
    // initial navigation
    pub navigation_load_ms: u64,
    pub navigation_settle_ms: u64,
    pub search_frame_ms: u64,
    pub frame_poll_ms: u64,
    pub ticket_popup_settle_ms: u64,
    // popup catcher
    pub popup_timeout_ms: u64,
    pub popup_grace_ms: u64,
    pub popup_diff_delay_ms: u64,
    pub popup_load_ms: u64,
    pub popup_settle_ms: u64,
    // workflow tab navigator
    pub tab_attempts: u32,
    pub tab_settle_before_ms: u64,
    pub tab_frame_search_ms: u64,
    pub tab_frame_poll_ms: u64,
    pub tab_settle_after_click_ms: u64,
    pub tab_click_ms: u64,
    pub workflow_frame_ms: u64,
    pub workflow_frame_load_ms: u64,
    pub task_rows_ms: u64,
    pub tab_retry_settle_ms: u64,
    // task anchor
    pub anchor_attempts: u32,
    pub anchor_retry_ms: u64,
    pub detail_popup_timeout_ms: u64,
    pub detail_settle_ms: u64,
    // detail form, lenient
    pub header_click_ms: u64,
    pub after_edit_settle_ms: u64,
    pub field_wait_ms: u64,
    pub field_click_ms: u64,
    pub after_assignee_settle_ms: u64,
    pub after_status_settle_ms: u64,
    pub after_save_settle_ms: u64,
    // detail form, strict
    pub edit_scan_ms: u64,
    pub scan_poll_ms: u64,
    pub pre_click_pause_ms: u64,
    pub strict_after_edit_settle_ms: u64,
    pub main_frame_scan_ms: u64,
    pub assignee_visible_ms: u64,
    pub save_scan_ms: u64,
    // batch pacing
    pub task_attempts: u32,
    pub task_retry_pause_ms: u64,
    pub between_tasks_ms: u64,
    // diagnostics
    pub content_attempts: u32,
    pub screenshot_attempts: u32,
    pub capture_retry_settle_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle_load_state_ms: 5000,
            settle_poll_ms: 150,
            navigation_load_ms: 12000,
            navigation_settle_ms: 2000,
            search_frame_ms: 30000,
            frame_poll_ms: 200,
            ticket_popup_settle_ms: 3000,
            popup_timeout_ms: 15000,
            popup_grace_ms: 1000,
            popup_diff_delay_ms: 400,
            popup_load_ms: 8000,
            popup_settle_ms: 2500,
            tab_attempts: 3,
            tab_settle_before_ms: 6000,
            tab_frame_search_ms: 6000,
            tab_frame_poll_ms: 150,
            tab_settle_after_click_ms: 1200,
            tab_click_ms: 4000,
            workflow_frame_ms: 15000,
            workflow_frame_load_ms: 3000,
            task_rows_ms: 4000,
            tab_retry_settle_ms: 800,
            anchor_attempts: 10,
            anchor_retry_ms: 250,
            detail_popup_timeout_ms: 12000,
            detail_settle_ms: 2500,
            header_click_ms: 8000,
            after_edit_settle_ms: 1200,
            field_wait_ms: 6000,
            field_click_ms: 2000,
            after_assignee_settle_ms: 500,
            after_status_settle_ms: 300,
            after_save_settle_ms: 1500,
            edit_scan_ms: 15000,
            scan_poll_ms: 500,
            pre_click_pause_ms: 500,
            strict_after_edit_settle_ms: 2000,
            main_frame_scan_ms: 15000,
            assignee_visible_ms: 10000,
            save_scan_ms: 10000,
            task_attempts: 3,
            task_retry_pause_ms: 2000,
            between_tasks_ms: 1500,
            content_attempts: 6,
            screenshot_attempts: 3,
            capture_retry_settle_ms: 2500,
        }
    }
}

impl Timings {
    /// Scale every duration by `factor`; attempt counts are left alone.
    pub fn scaled(&self, factor: f64) -> Self {
        let s = |ms: u64| ((ms as f64) * factor).round().max(1.0) as u64;
        Self {
            settle_load_state_ms: s(self.settle_load_state_ms),
            settle_poll_ms: s(self.settle_poll_ms),
            navigation_load_ms: s(self.navigation_load_ms),
            navigation_settle_ms: s(self.navigation_settle_ms),
            search_frame_ms: s(self.search_frame_ms),
            frame_poll_ms: s(self.frame_poll_ms),
            ticket_popup_settle_ms: s(self.ticket_popup_settle_ms),
            popup_timeout_ms: s(self.popup_timeout_ms),
            popup_grace_ms: s(self.popup_grace_ms),
            popup_diff_delay_ms: s(self.popup_diff_delay_ms),
            popup_load_ms: s(self.popup_load_ms),
            popup_settle_ms: s(self.popup_settle_ms),
            tab_settle_before_ms: s(self.tab_settle_before_ms),
            tab_frame_search_ms: s(self.tab_frame_search_ms),
            tab_frame_poll_ms: s(self.tab_frame_poll_ms),
            tab_settle_after_click_ms: s(self.tab_settle_after_click_ms),
            tab_click_ms: s(self.tab_click_ms),
            workflow_frame_ms: s(self.workflow_frame_ms),
            workflow_frame_load_ms: s(self.workflow_frame_load_ms),
            task_rows_ms: s(self.task_rows_ms),
            tab_retry_settle_ms: s(self.tab_retry_settle_ms),
            anchor_retry_ms: s(self.anchor_retry_ms),
            detail_popup_timeout_ms: s(self.detail_popup_timeout_ms),
            detail_settle_ms: s(self.detail_settle_ms),
            header_click_ms: s(self.header_click_ms),
            after_edit_settle_ms: s(self.after_edit_settle_ms),
            field_wait_ms: s(self.field_wait_ms),
            field_click_ms: s(self.field_click_ms),
            after_assignee_settle_ms: s(self.after_assignee_settle_ms),
            after_status_settle_ms: s(self.after_status_settle_ms),
            after_save_settle_ms: s(self.after_save_settle_ms),
            edit_scan_ms: s(self.edit_scan_ms),
            scan_poll_ms: s(self.scan_poll_ms),
            pre_click_pause_ms: s(self.pre_click_pause_ms),
            strict_after_edit_settle_ms: s(self.strict_after_edit_settle_ms),
            main_frame_scan_ms: s(self.main_frame_scan_ms),
            assignee_visible_ms: s(self.assignee_visible_ms),
            save_scan_ms: s(self.save_scan_ms),
            task_retry_pause_ms: s(self.task_retry_pause_ms),
            between_tasks_ms: s(self.between_tasks_ms),
            capture_retry_settle_ms: s(self.capture_retry_settle_ms),
            ..self.clone()
        }
    }
}

/// Shorthand used throughout the core.
pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub base_url: String,
    /// Display name written into the assignee auto-complete.
    pub assignee: String,
    pub headless: bool,
    pub viewport: Viewport,
    pub ignore_https_errors: bool,
    pub timings: Timings,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            base_url: target::DEFAULT_BASE_URL.to_string(),
            assignee: target::DEFAULT_ASSIGNEE.to_string(),
            headless: false,
            viewport: Viewport::default(),
            ignore_https_errors: true,
            timings: Timings::default(),
        }
    }
}

impl AutomationConfig {
    /// Defaults overridden by `SDM_*` environment variables (after reading an optional `.env`).
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }

        let mut config = Self::default();
        if let Some(url) = non_empty_var("SDM_BASE_URL") {
            config.base_url = url;
        }
        if let Some(assignee) = non_empty_var("SDM_ASSIGNEE") {
            config.assignee = assignee;
        }
        if let Some(headless) = non_empty_var("SDM_HEADLESS") {
            config.headless = parse_bool(&headless);
        }
        if let Some(scale) = non_empty_var("SDM_TIMING_SCALE") {
            match scale.parse::<f64>() {
                Ok(factor) if factor > 0.0 => config.timings = config.timings.scaled(factor),
                _ => warn!("Ignoring invalid SDM_TIMING_SCALE={}", scale),
            }
        }
        config
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = assignee.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
