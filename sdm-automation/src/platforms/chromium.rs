use crate::browser_script;
use crate::platforms::{
    BrowserSession, BrowsingContext, ContextStream, Frame, SelectBy, SelectState, SessionLauncher,
};
use crate::{AutomationConfig, AutomationError, Selector};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{
    BringToFrontParams, CaptureScreenshotFormat, FrameId,
};
use chromiumoxide::cdp::browser_protocol::target::{EventTargetCreated, TargetId};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::Handler;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// New targets are announced before their page is attached; poll this long for it.
const PAGE_ATTACH_ATTEMPTS: u32 = 20;
const PAGE_ATTACH_POLL: Duration = Duration::from_millis(100);
const CLICK_RETRY_POLL: Duration = Duration::from_millis(100);

fn cdp_error(e: CdpError) -> AutomationError {
    match e {
        CdpError::JavascriptException(details) => {
            let message = details
                .exception
                .as_ref()
                .and_then(|obj| obj.description.clone())
                .unwrap_or_else(|| details.text.clone());
            browser_script::classify_exception(&message)
        }
        CdpError::Timeout => AutomationError::Timeout("DevTools request timed out".to_string()),
        other => AutomationError::PlatformError(other.to_string()),
    }
}

/// Launches a local Chromium over the DevTools protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumLauncher;

#[async_trait::async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        config: &AutomationConfig,
    ) -> Result<Arc<dyn BrowserSession>, AutomationError> {
        let session = ChromiumSession::launch(config).await?;
        Ok(Arc::new(session))
    }
}

pub struct ChromiumSession {
    browser: Arc<Mutex<Browser>>,
    handler_task: JoinHandle<()>,
}

impl ChromiumSession {
    pub async fn launch(config: &AutomationConfig) -> Result<Self, AutomationError> {
        let mut builder = BrowserConfig::builder()
            .window_size(config.viewport.width, config.viewport.height)
            .viewport(None);
        if !config.headless {
            builder = builder.with_head();
        }
        if config.ignore_https_errors {
            builder = builder.arg("--ignore-certificate-errors");
        }
        let browser_config = builder.build().map_err(|e| {
            AutomationError::PlatformError(format!("failed to build browser config: {e}"))
        })?;

        let (browser, handler) = Browser::launch(browser_config).await.map_err(|e| {
            AutomationError::PlatformError(format!("failed to launch chromium: {e}"))
        })?;
        let handler_task = tokio::spawn(handler_loop(handler));
        debug!(headless = config.headless, "Chromium session launched");

        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            handler_task,
        })
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

async fn handler_loop(mut handler: Handler) {
    while let Some(event) = handler.next().await {
        if let Err(e) = event {
            debug!("DevTools handler stopped: {}", e);
            break;
        }
    }
}

/// Page targets as they are created, optionally only those opened by `opener`.
async fn page_targets(
    browser: Arc<Mutex<Browser>>,
    opener: Option<TargetId>,
) -> Result<ContextStream, AutomationError> {
    let events = browser
        .lock()
        .await
        .event_listener::<EventTargetCreated>()
        .await
        .map_err(cdp_error)?;
    let stream = events.filter_map(move |event| {
        let browser = browser.clone();
        let opener = opener.clone();
        async move {
            let info = &event.target_info;
            if info.r#type != "page" {
                return None;
            }
            if let Some(opener) = &opener {
                if info.opener_id.as_ref() != Some(opener) {
                    return None;
                }
            }
            let page = wait_for_page(&browser, &info.target_id).await?;
            Some(Arc::new(ChromiumContext::new(page, browser)) as Arc<dyn BrowsingContext>)
        }
    });
    Ok(stream.boxed())
}

async fn wait_for_page(browser: &Arc<Mutex<Browser>>, target_id: &TargetId) -> Option<Page> {
    for _ in 0..PAGE_ATTACH_ATTEMPTS {
        let pages = browser.lock().await.pages().await.ok()?;
        if let Some(page) = pages.into_iter().find(|p| p.target_id() == target_id) {
            return Some(page);
        }
        tokio::time::sleep(PAGE_ATTACH_POLL).await;
    }
    warn!("Target {:?} never attached as a page", target_id);
    None
}

#[async_trait::async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_context(&self) -> Result<Arc<dyn BrowsingContext>, AutomationError> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(cdp_error)?;
        Ok(Arc::new(ChromiumContext::new(page, self.browser.clone())))
    }

    async fn contexts(&self) -> Result<Vec<Arc<dyn BrowsingContext>>, AutomationError> {
        let pages = self.browser.lock().await.pages().await.map_err(cdp_error)?;
        Ok(pages
            .into_iter()
            .map(|page| {
                Arc::new(ChromiumContext::new(page, self.browser.clone())) as Arc<dyn BrowsingContext>
            })
            .collect())
    }

    async fn context_events(&self) -> Result<ContextStream, AutomationError> {
        page_targets(self.browser.clone(), None).await
    }

    async fn close(&self) -> Result<(), AutomationError> {
        let mut browser = self.browser.lock().await;
        browser.close().await.map_err(cdp_error)?;
        if let Err(e) = browser.wait().await {
            debug!("Chromium process did not exit cleanly: {}", e);
        }
        Ok(())
    }
}

/// One Chromium page target.
pub struct ChromiumContext {
    page: Page,
    browser: Arc<Mutex<Browser>>,
    closed: AtomicBool,
}

impl ChromiumContext {
    fn new(page: Page, browser: Arc<Mutex<Browser>>) -> Self {
        Self {
            page,
            browser,
            closed: AtomicBool::new(false),
        }
    }

    async fn frame(&self, frame_id: FrameId, main: Option<&FrameId>) -> Result<ChromiumFrame, AutomationError> {
        let name = self
            .page
            .frame_name(frame_id.clone())
            .await
            .map_err(cdp_error)?
            .unwrap_or_default();
        let url = self
            .page
            .frame_url(frame_id.clone())
            .await
            .map_err(cdp_error)?
            .unwrap_or_default();
        Ok(ChromiumFrame {
            page: self.page.clone(),
            is_main: main == Some(&frame_id),
            frame_id,
            name,
            url,
        })
    }
}

#[async_trait::async_trait]
impl BrowsingContext for ChromiumContext {
    fn id(&self) -> String {
        self.page.target_id().as_ref().to_string()
    }

    async fn frames(&self) -> Result<Vec<Arc<dyn Frame>>, AutomationError> {
        let main = self.page.mainframe().await.map_err(cdp_error)?;
        let mut ids = self.page.frames().await.map_err(cdp_error)?;
        // root first
        if let Some(main) = &main {
            if let Some(pos) = ids.iter().position(|id| id == main) {
                let root = ids.remove(pos);
                ids.insert(0, root);
            }
        }
        let mut frames: Vec<Arc<dyn Frame>> = Vec::with_capacity(ids.len());
        for id in ids {
            match self.frame(id, main.as_ref()).await {
                Ok(frame) => frames.push(Arc::new(frame)),
                Err(e) => debug!("Skipping detached frame: {}", e),
            }
        }
        Ok(frames)
    }

    async fn main_frame(&self) -> Result<Arc<dyn Frame>, AutomationError> {
        let main = self
            .page
            .mainframe()
            .await
            .map_err(cdp_error)?
            .ok_or_else(|| AutomationError::Navigating("page has no main frame yet".to_string()))?;
        let frame = self.frame(main.clone(), Some(&main)).await?;
        Ok(Arc::new(frame))
    }

    async fn goto(&self, url: &str) -> Result<(), AutomationError> {
        self.page.goto(url).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn ready_state(&self) -> Result<String, AutomationError> {
        let value = self
            .page
            .evaluate(browser_script::READY_STATE)
            .await
            .map_err(cdp_error)?;
        value
            .into_value::<String>()
            .map_err(|e| AutomationError::PlatformError(format!("unexpected readyState: {e}")))
    }

    async fn content(&self) -> Result<String, AutomationError> {
        self.page.content().await.map_err(cdp_error)
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, AutomationError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(full_page)
                    .build(),
            )
            .await
            .map_err(cdp_error)
    }

    async fn bring_to_front(&self) -> Result<(), AutomationError> {
        self.page
            .execute(BringToFrontParams::default())
            .await
            .map_err(cdp_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), AutomationError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.page.clone().close().await.map_err(cdp_error)
    }

    async fn is_closed(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return true;
        }
        match self.browser.lock().await.pages().await {
            Ok(pages) => !pages.iter().any(|p| p.target_id() == self.page.target_id()),
            Err(_) => true,
        }
    }

    async fn popup_events(&self) -> Result<ContextStream, AutomationError> {
        page_targets(self.browser.clone(), Some(self.page.target_id().clone())).await
    }
}

/// A frame addressed by id; scripts run in its default execution context.
pub struct ChromiumFrame {
    page: Page,
    frame_id: FrameId,
    name: String,
    url: String,
    is_main: bool,
}

#[derive(Debug, Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

impl ChromiumFrame {
    async fn eval(&self, expression: String) -> Result<Value, AutomationError> {
        let context_id = self
            .page
            .frame_execution_context(self.frame_id.clone())
            .await
            .map_err(cdp_error)?
            .ok_or_else(|| {
                AutomationError::Navigating(format!(
                    "frame '{}' has no execution context",
                    self.name
                ))
            })?;
        let params = EvaluateParams::builder()
            .expression(expression)
            .context_id(context_id)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(AutomationError::Internal)?;
        let result = self.page.evaluate(params).await.map_err(cdp_error)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn eval_as<T: serde::de::DeserializeOwned>(
        &self,
        expression: String,
    ) -> Result<T, AutomationError> {
        let value = self.eval(expression).await?;
        serde_json::from_value(value).map_err(|e| {
            AutomationError::PlatformError(format!("unexpected script result: {e}"))
        })
    }

    async fn mouse(&self, kind: DispatchMouseEventType, point: &Point) -> Result<(), AutomationError> {
        let mut builder = DispatchMouseEventParams::builder()
            .r#type(kind.clone())
            .x(point.x)
            .y(point.y);
        if kind != DispatchMouseEventType::MouseMoved {
            builder = builder.button(MouseButton::Left).click_count(1);
        }
        let params = builder.build().map_err(AutomationError::Internal)?;
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn key(&self, kind: DispatchKeyEventType, key: &str) -> Result<(), AutomationError> {
        let (code, key_code, text) = match key {
            "Enter" => ("Enter", 13, Some("\r")),
            "Tab" => ("Tab", 9, None),
            "Escape" => ("Escape", 27, None),
            other => {
                return Err(AutomationError::InvalidArgument(format!(
                    "unsupported key: {other}"
                )))
            }
        };
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key(key)
            .code(code)
            .windows_virtual_key_code(key_code)
            .native_virtual_key_code(key_code);
        if let (DispatchKeyEventType::KeyDown, Some(text)) = (&kind, text) {
            builder = builder.text(text);
        }
        let params = builder.build().map_err(AutomationError::Internal)?;
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Frame for ChromiumFrame {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn is_main(&self) -> bool {
        self.is_main
    }

    async fn count(&self, selector: &Selector) -> Result<usize, AutomationError> {
        self.eval_as(browser_script::count(selector)?).await
    }

    async fn is_visible(&self, selector: &Selector) -> Result<bool, AutomationError> {
        self.eval_as(browser_script::is_visible(selector)?).await
    }

    async fn attribute(
        &self,
        selector: &Selector,
        name: &str,
    ) -> Result<Option<String>, AutomationError> {
        self.eval_as(browser_script::attribute(selector, name)?).await
    }

    async fn texts(&self, selector: &Selector) -> Result<Vec<String>, AutomationError> {
        self.eval_as(browser_script::texts(selector)?).await
    }

    async fn row_cells(&self, selector: &Selector) -> Result<Vec<String>, AutomationError> {
        self.eval_as(browser_script::row_cells(selector)?).await
    }

    async fn click(&self, selector: &Selector, timeout: Duration) -> Result<(), AutomationError> {
        let script = browser_script::click_point(selector)?;
        let deadline = tokio::time::Instant::now() + timeout;
        let point = loop {
            match self.eval_as::<Point>(script.clone()).await {
                Ok(point) => break point,
                Err(e @ (AutomationError::ElementNotFound(_) | AutomationError::ElementNotVisible(_))) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(CLICK_RETRY_POLL).await;
        };
        self.mouse(DispatchMouseEventType::MouseMoved, &point).await?;
        self.mouse(DispatchMouseEventType::MousePressed, &point).await?;
        self.mouse(DispatchMouseEventType::MouseReleased, &point).await
    }

    async fn script_click(&self, selector: &Selector) -> Result<(), AutomationError> {
        self.eval(browser_script::script_click(selector)?).await?;
        Ok(())
    }

    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), AutomationError> {
        self.eval(browser_script::fill(selector, value)?).await?;
        Ok(())
    }

    async fn press(&self, selector: &Selector, key: &str) -> Result<(), AutomationError> {
        self.eval(browser_script::focus(selector)?).await?;
        self.key(DispatchKeyEventType::KeyDown, key).await?;
        self.key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn blur(&self, selector: &Selector) -> Result<(), AutomationError> {
        self.eval(browser_script::blur(selector)?).await?;
        Ok(())
    }

    async fn select_option(
        &self,
        selector: &Selector,
        by: &SelectBy,
    ) -> Result<bool, AutomationError> {
        let by = match by {
            SelectBy::Value(value) => serde_json::json!({ "value": value }),
            SelectBy::Label(label) => serde_json::json!({ "label": label }),
        };
        self.eval_as(browser_script::select_option(selector, &by)?).await
    }

    async fn select_state(&self, selector: &Selector) -> Result<SelectState, AutomationError> {
        self.eval_as(browser_script::select_state(selector)?).await
    }

    async fn call_global(
        &self,
        function: &str,
        args: Vec<Value>,
    ) -> Result<bool, AutomationError> {
        self.eval_as(browser_script::call_global(function, &args)?).await
    }

    async fn content(&self) -> Result<String, AutomationError> {
        self.eval_as(browser_script::OUTER_HTML.to_string()).await
    }

    async fn ready_state(&self) -> Result<String, AutomationError> {
        self.eval_as(browser_script::READY_STATE.to_string()).await
    }
}
