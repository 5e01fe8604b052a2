//! In-memory engine: contexts with frame trees whose elements react to clicks.

use crate::platforms::{
    BrowserSession, BrowsingContext, ContextStream, Frame, SelectBy, SelectOption, SelectState,
    SessionLauncher,
};
use crate::{AutomationConfig, AutomationError, Selector};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

pub type PageFactory = Arc<dyn Fn() -> PageSpec + Send + Sync>;
pub type FrameFactory = Arc<dyn Fn() -> FrameSpec + Send + Sync>;
pub type Hook = Arc<dyn Fn(&FakeContext) -> Result<(), AutomationError> + Send + Sync>;

/// Which listeners hear about a newly opened context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announce {
    /// Owner popup stream and session stream
    Popup,
    Session,
    Silent,
}

#[derive(Clone)]
pub enum Effect {
    Open { page: PageFactory, announce: Announce },
    /// Make elements with this key visible in every frame of the context
    Show(&'static str),
    AddClass(&'static str, &'static str),
    Attach(FrameFactory),
    Run(Hook),
}

#[derive(Clone)]
pub struct Element {
    pub key: &'static str,
    pub css: Vec<String>,
    pub text: String,
    pub visible: bool,
    pub clickable: bool,
    pub attrs: HashMap<String, String>,
    pub value: String,
    pub select: Option<SelectState>,
    pub cells: Vec<String>,
    pub on_click: Vec<Effect>,
}

impl Element {
    pub fn new(key: &'static str, css: &[&str], text: &str) -> Self {
        Self {
            key,
            css: css.iter().map(|c| c.to_string()).collect(),
            text: text.to_string(),
            visible: true,
            clickable: true,
            attrs: HashMap::new(),
            value: String::new(),
            select: None,
            cells: Vec::new(),
            on_click: Vec::new(),
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Pointer and script clicks both fail.
    pub fn broken(mut self) -> Self {
        self.clickable = false;
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn cells(mut self, cells: &[&str]) -> Self {
        self.cells = cells.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn select(mut self, current: &str, options: &[(&str, &str)]) -> Self {
        let options: Vec<SelectOption> = options
            .iter()
            .map(|(value, label)| SelectOption {
                value: value.to_string(),
                label: label.to_string(),
            })
            .collect();
        let label = options
            .iter()
            .find(|o| o.value == current)
            .map(|o| o.label.clone())
            .unwrap_or_default();
        self.select = Some(SelectState {
            value: current.to_string(),
            label,
            options,
        });
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }

    fn matches(&self, selector: &Selector) -> bool {
        let css = match selector {
            Selector::Css { css } | Selector::ExactText { css, .. } | Selector::HasText { css, .. } => css,
            _ => return false,
        };
        let css_hit = css
            .split(',')
            .map(str::trim)
            .any(|part| self.css.iter().any(|c| c == part));
        css_hit && selector.text_matches(&self.text)
    }
}

#[derive(Clone, Default)]
pub struct FrameSpec {
    pub name: String,
    pub url: String,
    pub elements: Vec<Element>,
    pub globals: HashMap<String, Vec<Effect>>,
}

impl FrameSpec {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn with(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    /// A page-global function. `function` may carry its arguments (`do_default(0)`)
    /// to react to that call only.
    pub fn global(mut self, function: &str, effects: Vec<Effect>) -> Self {
        self.globals.insert(function.to_string(), effects);
        self
    }
}

/// A context's content; the first frame is the root.
#[derive(Clone)]
pub struct PageSpec {
    pub label: String,
    pub frames: Vec<FrameSpec>,
}

impl PageSpec {
    pub fn new(label: impl Into<String>, frames: Vec<FrameSpec>) -> Self {
        Self {
            label: label.into(),
            frames,
        }
    }
}

fn stream_of(rx: broadcast::Receiver<Arc<FakeContext>>) -> ContextStream {
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(ctx) => return Some((ctx as Arc<dyn BrowsingContext>, rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

/// Everything one simulated browser holds, plus a log of what the automation did.
pub struct World {
    contexts: Mutex<Vec<Arc<FakeContext>>>,
    opened: broadcast::Sender<Arc<FakeContext>>,
    log: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    home: PageFactory,
    launches: AtomicUsize,
    session_closed: AtomicBool,
}

impl World {
    pub fn new(home: PageFactory) -> Arc<Self> {
        let (opened, _) = broadcast::channel(64);
        Arc::new(Self {
            contexts: Mutex::new(Vec::new()),
            opened,
            log: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            home,
            launches: AtomicUsize::new(0),
            session_closed: AtomicBool::new(false),
        })
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn session_closed(&self) -> bool {
        self.session_closed.load(Ordering::SeqCst)
    }

    pub fn all_contexts(&self) -> Vec<Arc<FakeContext>> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn open_contexts(&self) -> Vec<Arc<FakeContext>> {
        self.all_contexts()
            .into_iter()
            .filter(|c| !c.closed.load(Ordering::SeqCst))
            .collect()
    }

    /// Create a context without announcing it.
    pub fn create(self: &Arc<Self>, spec: PageSpec) -> Arc<FakeContext> {
        let id = format!("ctx-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let (popups, _) = broadcast::channel(16);
        let world = Arc::downgrade(self);
        let context = Arc::new_cyclic(|this: &Weak<FakeContext>| {
            let frames = spec
                .frames
                .into_iter()
                .enumerate()
                .map(|(i, frame)| Arc::new(FakeFrame::new(frame, i == 0, this.clone())))
                .collect();
            FakeContext {
                id,
                label: spec.label,
                world,
                frames: Mutex::new(frames),
                closed: AtomicBool::new(false),
                popups,
                this: this.clone(),
            }
        });
        self.record(format!("open {}#{}", context.label, context.id));
        self.contexts.lock().unwrap().push(context.clone());
        context
    }
}

pub struct FakeContext {
    id: String,
    label: String,
    world: Weak<World>,
    frames: Mutex<Vec<Arc<FakeFrame>>>,
    closed: AtomicBool,
    popups: broadcast::Sender<Arc<FakeContext>>,
    this: Weak<FakeContext>,
}

impl FakeContext {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), AutomationError> {
        if self.closed() {
            Err(AutomationError::ContextClosed(self.id.clone()))
        } else {
            Ok(())
        }
    }

    fn fake_frames(&self) -> Vec<Arc<FakeFrame>> {
        self.frames.lock().unwrap().clone()
    }

    /// First element with this key in any frame.
    pub fn element(&self, key: &str) -> Option<Element> {
        self.fake_frames().iter().find_map(|frame| {
            frame
                .elements
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.key == key)
                .cloned()
        })
    }

    fn record(&self, entry: String) {
        if let Some(world) = self.world.upgrade() {
            world.record(entry);
        }
    }

    fn apply(&self, effects: Vec<Effect>) -> Result<(), AutomationError> {
        for effect in effects {
            match effect {
                Effect::Open { page, announce } => {
                    let world = self
                        .world
                        .upgrade()
                        .ok_or_else(|| AutomationError::Internal("world dropped".into()))?;
                    let opened = world.create(page());
                    match announce {
                        Announce::Popup => {
                            let _ = self.popups.send(opened.clone());
                            let _ = world.opened.send(opened);
                        }
                        Announce::Session => {
                            let _ = world.opened.send(opened);
                        }
                        Announce::Silent => {}
                    }
                }
                Effect::Show(key) => {
                    for frame in self.fake_frames() {
                        for element in frame.elements.lock().unwrap().iter_mut() {
                            if element.key == key {
                                element.visible = true;
                            }
                        }
                    }
                }
                Effect::AddClass(key, class) => {
                    for frame in self.fake_frames() {
                        for element in frame.elements.lock().unwrap().iter_mut() {
                            if element.key == key {
                                let entry = element.attrs.entry("class".to_string()).or_default();
                                entry.push(' ');
                                entry.push_str(class);
                            }
                        }
                    }
                }
                Effect::Attach(factory) => {
                    let frame = Arc::new(FakeFrame::new(factory(), false, self.this.clone()));
                    self.frames.lock().unwrap().push(frame);
                }
                Effect::Run(hook) => hook(self)?,
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BrowsingContext for FakeContext {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn frames(&self) -> Result<Vec<Arc<dyn Frame>>, AutomationError> {
        self.ensure_open()?;
        Ok(self
            .fake_frames()
            .into_iter()
            .map(|f| f as Arc<dyn Frame>)
            .collect())
    }

    async fn main_frame(&self) -> Result<Arc<dyn Frame>, AutomationError> {
        self.ensure_open()?;
        self.fake_frames()
            .into_iter()
            .next()
            .map(|f| f as Arc<dyn Frame>)
            .ok_or_else(|| AutomationError::ElementNotFound("no root frame".into()))
    }

    async fn goto(&self, url: &str) -> Result<(), AutomationError> {
        self.ensure_open()?;
        self.record(format!("goto {url}"));
        Ok(())
    }

    async fn ready_state(&self) -> Result<String, AutomationError> {
        self.ensure_open()?;
        Ok("complete".to_string())
    }

    async fn content(&self) -> Result<String, AutomationError> {
        self.main_frame().await?.content().await
    }

    async fn screenshot(&self, _full_page: bool) -> Result<Vec<u8>, AutomationError> {
        self.ensure_open()?;
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn bring_to_front(&self) -> Result<(), AutomationError> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<(), AutomationError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.record(format!("close {}#{}", self.label, self.id));
        }
        Ok(())
    }

    async fn is_closed(&self) -> bool {
        self.closed()
    }

    async fn popup_events(&self) -> Result<ContextStream, AutomationError> {
        Ok(stream_of(self.popups.subscribe()))
    }
}

pub struct FakeFrame {
    name: String,
    url: String,
    is_main: bool,
    elements: Mutex<Vec<Element>>,
    globals: HashMap<String, Vec<Effect>>,
    context: Weak<FakeContext>,
}

impl FakeFrame {
    fn new(spec: FrameSpec, is_main: bool, context: Weak<FakeContext>) -> Self {
        Self {
            name: spec.name,
            url: spec.url,
            is_main,
            elements: Mutex::new(spec.elements),
            globals: spec.globals,
            context,
        }
    }

    fn context(&self) -> Result<Arc<FakeContext>, AutomationError> {
        let context = self
            .context
            .upgrade()
            .ok_or_else(|| AutomationError::ContextClosed(self.name.clone()))?;
        context.ensure_open()?;
        Ok(context)
    }

    /// Indices of the first alternative with any match.
    fn hits(&self, selector: &Selector) -> Result<Vec<usize>, AutomationError> {
        self.context()?;
        if let Selector::Invalid { reason } = selector {
            return Err(AutomationError::InvalidSelector(reason.clone()));
        }
        let elements = self.elements.lock().unwrap();
        for alternative in selector.alternatives() {
            let hits: Vec<usize> = elements
                .iter()
                .enumerate()
                .filter(|(_, e)| e.matches(alternative))
                .map(|(i, _)| i)
                .collect();
            if !hits.is_empty() {
                return Ok(hits);
            }
        }
        Ok(Vec::new())
    }

    fn with_first<R>(
        &self,
        selector: &Selector,
        f: impl FnOnce(&mut Element) -> R,
    ) -> Result<R, AutomationError> {
        let index = self
            .hits(selector)?
            .first()
            .copied()
            .ok_or_else(|| AutomationError::ElementNotFound(selector.to_string()))?;
        let mut elements = self.elements.lock().unwrap();
        Ok(f(&mut elements[index]))
    }

    fn activate(&self, selector: &Selector, pointer: bool) -> Result<(), AutomationError> {
        let (key, effects) = self.with_first(selector, |e| {
            if pointer && !e.visible {
                return Err(AutomationError::ElementNotVisible(e.key.to_string()));
            }
            if !e.clickable {
                return Err(AutomationError::PlatformError(format!("{} did not react", e.key)));
            }
            Ok((e.key, e.on_click.clone()))
        })??;
        let context = self.context()?;
        let kind = if pointer { "click" } else { "script_click" };
        context.record(format!("{kind} {}/{}/{key}", context.label, self.name));
        context.apply(effects)
    }
}

#[async_trait::async_trait]
impl Frame for FakeFrame {
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
        Ok(self.hits(selector)?.len())
    }

    async fn is_visible(&self, selector: &Selector) -> Result<bool, AutomationError> {
        match self.with_first(selector, |e| e.visible) {
            Ok(visible) => Ok(visible),
            Err(AutomationError::ElementNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn attribute(
        &self,
        selector: &Selector,
        name: &str,
    ) -> Result<Option<String>, AutomationError> {
        self.with_first(selector, |e| e.attrs.get(name).cloned())
    }

    async fn texts(&self, selector: &Selector) -> Result<Vec<String>, AutomationError> {
        let hits = self.hits(selector)?;
        let elements = self.elements.lock().unwrap();
        Ok(hits
            .into_iter()
            .map(|i| elements[i].text.trim().to_string())
            .collect())
    }

    async fn row_cells(&self, selector: &Selector) -> Result<Vec<String>, AutomationError> {
        self.with_first(selector, |e| e.cells.clone())
    }

    async fn click(&self, selector: &Selector, _timeout: Duration) -> Result<(), AutomationError> {
        self.activate(selector, true)
    }

    async fn script_click(&self, selector: &Selector) -> Result<(), AutomationError> {
        self.activate(selector, false)
    }

    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), AutomationError> {
        let key = self.with_first(selector, |e| {
            e.value = value.to_string();
            e.key
        })?;
        let context = self.context()?;
        context.record(format!("fill {}/{}/{key}={value}", context.label, self.name));
        Ok(())
    }

    async fn press(&self, selector: &Selector, key: &str) -> Result<(), AutomationError> {
        let element = self.with_first(selector, |e| e.key)?;
        self.context()?.record(format!("press {element} {key}"));
        Ok(())
    }

    async fn blur(&self, selector: &Selector) -> Result<(), AutomationError> {
        self.with_first(selector, |_| ())
    }

    async fn select_option(
        &self,
        selector: &Selector,
        by: &SelectBy,
    ) -> Result<bool, AutomationError> {
        self.with_first(selector, |e| {
            let Some(state) = e.select.as_mut() else {
                return Err(AutomationError::InvalidArgument(format!("{} is not a select", e.key)));
            };
            let chosen = state
                .options
                .iter()
                .find(|o| match by {
                    SelectBy::Value(value) => o.value == *value,
                    SelectBy::Label(label) => o.label == *label,
                })
                .cloned();
            Ok(match chosen {
                Some(option) => {
                    state.value = option.value;
                    state.label = option.label;
                    true
                }
                None => false,
            })
        })?
    }

    async fn select_state(&self, selector: &Selector) -> Result<SelectState, AutomationError> {
        self.with_first(selector, |e| e.select.clone())?
            .ok_or_else(|| AutomationError::InvalidArgument("not a select".into()))
    }

    async fn call_global(
        &self,
        function: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<bool, AutomationError> {
        let context = self.context()?;
        let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let call = format!("{function}({})", rendered.join(","));
        let Some(effects) = self
            .globals
            .get(&call)
            .or_else(|| self.globals.get(function))
            .cloned()
        else {
            return Ok(false);
        };
        context.record(format!("call {call} in {}", self.name));
        context.apply(effects)?;
        Ok(true)
    }

    async fn content(&self) -> Result<String, AutomationError> {
        self.context()?;
        let elements = self.elements.lock().unwrap();
        let body: String = elements
            .iter()
            .map(|e| format!("<i data-key=\"{}\">{}</i>", e.key, e.text))
            .collect();
        Ok(format!(
            "<html><body data-frame=\"{}\">{body}</body></html>",
            self.name
        ))
    }

    async fn ready_state(&self) -> Result<String, AutomationError> {
        self.context()?;
        Ok("complete".to_string())
    }
}

pub struct FakeSession {
    world: Arc<World>,
}

impl FakeSession {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }
}

#[async_trait::async_trait]
impl BrowserSession for FakeSession {
    async fn new_context(&self) -> Result<Arc<dyn BrowsingContext>, AutomationError> {
        let context = self.world.create((self.world.home)());
        Ok(context as Arc<dyn BrowsingContext>)
    }

    async fn contexts(&self) -> Result<Vec<Arc<dyn BrowsingContext>>, AutomationError> {
        Ok(self
            .world
            .open_contexts()
            .into_iter()
            .map(|c| c as Arc<dyn BrowsingContext>)
            .collect())
    }

    async fn context_events(&self) -> Result<ContextStream, AutomationError> {
        Ok(stream_of(self.world.opened.subscribe()))
    }

    async fn close(&self) -> Result<(), AutomationError> {
        for context in self.world.open_contexts() {
            context.close().await?;
        }
        self.world.session_closed.store(true, Ordering::SeqCst);
        self.world.record("session closed".to_string());
        Ok(())
    }
}

pub struct FakeLauncher {
    pub world: Arc<World>,
}

#[async_trait::async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(
        &self,
        _config: &AutomationConfig,
    ) -> Result<Arc<dyn BrowserSession>, AutomationError> {
        self.world.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession::new(self.world.clone())))
    }
}
