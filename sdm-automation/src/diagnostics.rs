//! Audit snapshots (HTML and screenshots) of browsing contexts.
//!
//! Capturing never aborts the caller: failures are logged and the run continues.

use crate::config::{ms, Timings};
use crate::platforms::BrowsingContext;
use crate::settle::settle;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

pub const UNAVAILABLE_HTML: &str = "<!-- [unavailable] -->";

/// Filesystem-safe form of a frame or ticket name; runs of other characters become `_`.
pub fn sanitize(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars =
        UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]+").expect("pattern is valid"));
    let cleaned = unsafe_chars.replace_all(name, "_").into_owned();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// `OPEN_<search>_<timestamp>` with `:` and `.` of the ISO timestamp replaced by `-`.
pub fn artifact_base(dir: &Path, search_text: &str, now: DateTime<Utc>) -> PathBuf {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    dir.join(format!("OPEN_{}_{}", sanitize(search_text), stamp))
}

/// HTML of the context, retrying while it is mid-navigation, then falling back to the
/// root frame's `outerHTML` and finally to a placeholder.
pub async fn content_safe(context: &dyn BrowsingContext, timings: &Timings) -> String {
    for attempt in 1..=timings.content_attempts.max(1) {
        match context.content().await {
            Ok(html) => return html,
            Err(e) if e.is_navigation() => {
                debug!("Content capture attempt {} hit a navigation: {}", attempt, e);
                settle(context, ms(timings.capture_retry_settle_ms), timings).await;
            }
            Err(e) => {
                debug!("Content capture failed: {}", e);
                break;
            }
        }
    }
    match context.main_frame().await {
        Ok(frame) => frame
            .content()
            .await
            .unwrap_or_else(|_| UNAVAILABLE_HTML.to_string()),
        Err(_) => UNAVAILABLE_HTML.to_string(),
    }
}

/// Full-page PNG written to `path`, retried while the context is mid-navigation.
pub async fn screenshot_safe(
    context: &dyn BrowsingContext,
    path: &Path,
    timings: &Timings,
) -> Result<(), crate::AutomationError> {
    let attempts = timings.screenshot_attempts.max(1);
    let mut attempt = 1;
    let png = loop {
        match context.screenshot(true).await {
            Ok(png) => break png,
            Err(e) if e.is_navigation() && attempt < attempts => {
                debug!("Screenshot attempt {} hit a navigation: {}", attempt, e);
                settle(context, ms(timings.capture_retry_settle_ms), timings).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    };
    tokio::fs::write(path, png).await.map_err(|e| {
        crate::AutomationError::Internal(format!("failed to write {}: {e}", path.display()))
    })
}

async fn save(path: &Path, content: &str) {
    if let Err(e) = tokio::fs::write(path, content).await {
        warn!("Could not write {}: {}", path.display(), e);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Before,
    After,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Before => f.write_str("Before"),
            Phase::After => f.write_str("After"),
        }
    }
}

/// Where one run writes its snapshots.
#[derive(Debug, Clone)]
pub struct Artifacts {
    base: PathBuf,
    timings: Timings,
}

impl Artifacts {
    pub fn new(dir: &Path, search_text: &str, timings: Timings) -> Self {
        Self {
            base: artifact_base(dir, search_text, Utc::now()),
            timings,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn path(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .base
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!("_{suffix}"));
        self.base.with_file_name(name)
    }

    /// Top-level HTML and screenshot plus the HTML of every attached frame.
    pub async fn dump_page(&self, context: &dyn BrowsingContext, tag: &str) {
        let html = content_safe(context, &self.timings).await;
        save(&self.path(&format!("{tag}_Top.html")), &html).await;
        let png = self.path(&format!("{tag}_Top.png"));
        if let Err(e) = screenshot_safe(context, &png, &self.timings).await {
            warn!("Screenshot for {} failed: {}", tag, e);
        }

        let frames = match context.frames().await {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Could not enumerate frames for {}: {}", tag, e);
                return;
            }
        };
        for (i, frame) in frames.iter().enumerate() {
            match frame.content().await {
                Ok(html) => {
                    let suffix = format!("{tag}_Frame_{i}_{}.html", sanitize(&frame.name()));
                    save(&self.path(&suffix), &html).await;
                }
                Err(e) => debug!("Frame {} content unavailable: {}", i, e),
            }
        }
        info!("Dumped '{}' to {}", tag, self.base.display());
    }

    /// Before/after record of one task's detail popup.
    pub async fn task_snapshot(&self, context: &dyn BrowsingContext, task: &str, phase: Phase) {
        let html = content_safe(context, &self.timings).await;
        save(&self.path(&format!("Task_{task}_{phase}.html")), &html).await;
        let png = self.path(&format!("Task_{task}_{phase}.png"));
        if let Err(e) = screenshot_safe(context, &png, &self.timings).await {
            warn!("Task {} {} screenshot failed: {}", task, phase, e);
        }
    }
}
