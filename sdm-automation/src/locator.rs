use crate::errors::AutomationError;
use crate::platforms::{BrowsingContext, Frame};
use crate::selector::Selector;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Predicate over a frame; frames are never trusted to be addressable by name alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameQuery {
    Name(String),
    UrlContains(String),
    /// Every selector resolves to at least one element in the frame
    HasAll(Vec<Selector>),
    /// At least one selector resolves
    HasAny(Vec<Selector>),
}

impl FrameQuery {
    pub async fn matches(&self, frame: &dyn Frame) -> bool {
        match self {
            FrameQuery::Name(name) => frame.name() == *name,
            FrameQuery::UrlContains(marker) => frame.url().contains(marker.as_str()),
            FrameQuery::HasAll(selectors) => {
                for selector in selectors {
                    if !has_match(frame, selector).await {
                        return false;
                    }
                }
                true
            }
            FrameQuery::HasAny(selectors) => {
                for selector in selectors {
                    if has_match(frame, selector).await {
                        return true;
                    }
                }
                false
            }
        }
    }
}

impl fmt::Display for FrameQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameQuery::Name(name) => write!(f, "name={name}"),
            FrameQuery::UrlContains(marker) => write!(f, "url~{marker}"),
            FrameQuery::HasAll(selectors) | FrameQuery::HasAny(selectors) => {
                let joiner = if matches!(self, FrameQuery::HasAll(_)) { " && " } else { " | " };
                let parts: Vec<String> = selectors.iter().map(|s| s.to_string()).collect();
                write!(f, "[{}]", parts.join(joiner))
            }
        }
    }
}

/// Query errors (detached frame, mid-navigation) count as "no match".
pub async fn has_match(frame: &dyn Frame, selector: &Selector) -> bool {
    matches!(frame.count(selector).await, Ok(n) if n > 0)
}

/// One pass over the frames currently attached, in enumeration order.
pub async fn first_frame_matching(
    context: &dyn BrowsingContext,
    query: &FrameQuery,
) -> Option<Arc<dyn Frame>> {
    let frames = match context.frames().await {
        Ok(frames) => frames,
        Err(e) => {
            debug!("Frame enumeration failed: {}", e);
            return None;
        }
    };
    for frame in frames {
        if query.matches(frame.as_ref()).await {
            return Some(frame);
        }
    }
    None
}

/// Poll every attached frame until one satisfies `query`; `None` on timeout.
#[instrument(level = "debug", skip(context, timeout, poll), fields(query = %query))]
pub async fn find_frame(
    context: &dyn BrowsingContext,
    query: &FrameQuery,
    timeout: Duration,
    poll: Duration,
) -> Option<Arc<dyn Frame>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(frame) = first_frame_matching(context, query).await {
            debug!("Matched frame '{}'", frame.name());
            return Some(frame);
        }
        if Instant::now() >= deadline {
            debug!("No frame matched within {:?}", timeout);
            return None;
        }
        tokio::time::sleep(poll).await;
    }
}

/// A frame in which *all* selectors resolve.
pub async fn find_frame_with_selectors(
    context: &dyn BrowsingContext,
    selectors: &[Selector],
    timeout: Duration,
    poll: Duration,
) -> Option<Arc<dyn Frame>> {
    find_frame(
        context,
        &FrameQuery::HasAll(selectors.to_vec()),
        timeout,
        poll,
    )
    .await
}

/// Wait until `selector` is attached in `frame`.
pub async fn wait_for_selector(
    frame: &dyn Frame,
    selector: &Selector,
    timeout: Duration,
    poll: Duration,
) -> Result<(), AutomationError> {
    let deadline = Instant::now() + timeout;
    loop {
        if has_match(frame, selector).await {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(AutomationError::Timeout(format!(
                "Timed out after {timeout:?} waiting for {selector} in frame '{}'",
                frame.name()
            )));
        }
        tokio::time::sleep(poll).await;
    }
}

/// Wait until the first match of `selector` is visible in `frame`.
pub async fn wait_for_visible(
    frame: &dyn Frame,
    selector: &Selector,
    timeout: Duration,
    poll: Duration,
) -> Result<(), AutomationError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(true) = frame.is_visible(selector).await {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(AutomationError::ElementNotVisible(format!(
                "{selector} not visible in frame '{}' after {timeout:?}",
                frame.name()
            )));
        }
        tokio::time::sleep(poll).await;
    }
}
