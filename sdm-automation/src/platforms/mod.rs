use crate::{AutomationConfig, AutomationError, Selector};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod chromium;

pub use chromium::{ChromiumLauncher, ChromiumSession};

/// Stream of browsing contexts as they are opened.
pub type ContextStream = BoxStream<'static, Arc<dyn BrowsingContext>>;

/// Load milestones a context or frame can be waited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// `document.readyState` has left `loading`.
    DomContentLoaded,
    /// `document.readyState` is `complete`.
    Load,
}

impl LoadState {
    pub fn is_reached(&self, ready_state: &str) -> bool {
        match self {
            LoadState::DomContentLoaded => matches!(ready_state, "interactive" | "complete"),
            LoadState::Load => ready_state == "complete",
        }
    }
}

/// How an option of a `<select>` is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectBy {
    Value(String),
    Label(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// Current state of a `<select>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectState {
    pub value: String,
    pub label: String,
    pub options: Vec<SelectOption>,
}

/// A node in a context's frame tree. Handles are snapshots: re-enumerate
/// after anything that may navigate.
#[async_trait::async_trait]
pub trait Frame: Send + Sync {
    /// Frame name (`name` attribute of its iframe), empty for unnamed frames
    fn name(&self) -> String;

    fn url(&self) -> String;

    /// Whether this is the context's root frame
    fn is_main(&self) -> bool;

    /// Number of elements matching the selector
    async fn count(&self, selector: &Selector) -> Result<usize, AutomationError>;

    /// Whether the first match is rendered and visible
    async fn is_visible(&self, selector: &Selector) -> Result<bool, AutomationError>;

    /// Attribute of the first match; `Ok(None)` when the attribute is absent
    async fn attribute(
        &self,
        selector: &Selector,
        name: &str,
    ) -> Result<Option<String>, AutomationError>;

    /// Trimmed text of every match, in document order
    async fn texts(&self, selector: &Selector) -> Result<Vec<String>, AutomationError>;

    /// Trimmed text of each cell of the table row containing the first match
    async fn row_cells(&self, selector: &Selector) -> Result<Vec<String>, AutomationError>;

    /// Scroll the first match into view and click it with the pointer
    async fn click(&self, selector: &Selector, timeout: Duration) -> Result<(), AutomationError>;

    /// Invoke the first match's `click()` directly from script
    async fn script_click(&self, selector: &Selector) -> Result<(), AutomationError>;

    /// Replace the value of the first match and fire input/change
    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), AutomationError>;

    /// Focus the first match and press a key (e.g. "Enter")
    async fn press(&self, selector: &Selector, key: &str) -> Result<(), AutomationError>;

    async fn blur(&self, selector: &Selector) -> Result<(), AutomationError>;

    /// Select an option; `Ok(false)` when no option matches
    async fn select_option(
        &self,
        selector: &Selector,
        by: &SelectBy,
    ) -> Result<bool, AutomationError>;

    async fn select_state(&self, selector: &Selector) -> Result<SelectState, AutomationError>;

    /// Call a page-global function; `Ok(false)` when it is not defined
    async fn call_global(
        &self,
        function: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<bool, AutomationError>;

    /// Serialized document (`outerHTML`)
    async fn content(&self) -> Result<String, AutomationError>;

    /// `document.readyState`; failing means the frame is mid-navigation or detached
    async fn ready_state(&self) -> Result<String, AutomationError>;

    async fn wait_for_load_state(
        &self,
        state: LoadState,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        poll_load_state(|| self.ready_state(), state, timeout).await
    }
}

impl std::fmt::Debug for dyn Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({:?})", self.name())
    }
}

/// An isolated window/tab owning a frame tree
#[async_trait::async_trait]
pub trait BrowsingContext: Send + Sync {
    /// Stable identifier, unique within a session
    fn id(&self) -> String;

    /// Every frame currently attached, root first
    async fn frames(&self) -> Result<Vec<Arc<dyn Frame>>, AutomationError>;

    async fn main_frame(&self) -> Result<Arc<dyn Frame>, AutomationError>;

    async fn frame_by_name(&self, name: &str) -> Result<Option<Arc<dyn Frame>>, AutomationError> {
        Ok(self.frames().await?.into_iter().find(|f| f.name() == name))
    }

    async fn goto(&self, url: &str) -> Result<(), AutomationError>;

    async fn wait_for_load_state(
        &self,
        state: LoadState,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        poll_load_state(|| self.ready_state(), state, timeout).await
    }

    /// Trivial script evaluation against the root document
    async fn ready_state(&self) -> Result<String, AutomationError>;

    async fn content(&self) -> Result<String, AutomationError>;

    /// PNG bytes
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, AutomationError>;

    async fn bring_to_front(&self) -> Result<(), AutomationError>;

    async fn close(&self) -> Result<(), AutomationError>;

    async fn is_closed(&self) -> bool;

    /// Contexts opened with this context as their opener. Subscribe before acting.
    async fn popup_events(&self) -> Result<ContextStream, AutomationError>;
}

/// One browser connection and the contexts open in it
#[async_trait::async_trait]
pub trait BrowserSession: Send + Sync {
    /// Open a fresh top-level context
    async fn new_context(&self) -> Result<Arc<dyn BrowsingContext>, AutomationError>;

    async fn contexts(&self) -> Result<Vec<Arc<dyn BrowsingContext>>, AutomationError>;

    /// Every context opened in this session, whatever opened it. Subscribe before acting.
    async fn context_events(&self) -> Result<ContextStream, AutomationError>;

    async fn close(&self) -> Result<(), AutomationError>;
}

/// Starts browser sessions
#[async_trait::async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(
        &self,
        config: &AutomationConfig,
    ) -> Result<Arc<dyn BrowserSession>, AutomationError>;
}

async fn poll_load_state<F, Fut>(
    ready_state: F,
    state: LoadState,
    timeout: Duration,
) -> Result<(), AutomationError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<String, AutomationError>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(current) = ready_state().await {
            if state.is_reached(&current) {
                return Ok(());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(AutomationError::Timeout(format!(
                "load state {state:?} not reached within {timeout:?}"
            )));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
