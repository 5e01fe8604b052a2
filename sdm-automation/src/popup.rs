use crate::config::{ms, Timings};
use crate::platforms::{BrowserSession, BrowsingContext, ContextStream, LoadState};
use crate::settle::settle;
use futures::StreamExt;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

async fn context_ids(session: &dyn BrowserSession) -> HashSet<String> {
    match session.contexts().await {
        Ok(contexts) => contexts.iter().map(|c| c.id()).collect(),
        Err(e) => {
            debug!("Could not list contexts: {}", e);
            HashSet::new()
        }
    }
}

fn or_pending(stream: Result<ContextStream, crate::AutomationError>, source: &str) -> ContextStream {
    stream.unwrap_or_else(|e| {
        debug!("{} events unavailable: {}", source, e);
        futures::stream::pending().boxed()
    })
}

/// Run `action` once and return the browsing context it opened, if any.
///
/// The new context may be announced as a popup of `owner`, as a new context
/// on the session, or by neither before the grace period ends; the last case
/// falls back to diffing the open contexts. `None` is not an error.
#[instrument(level = "debug", skip_all, fields(owner = %owner.id()))]
pub async fn run_and_catch_popup<A>(
    session: &dyn BrowserSession,
    owner: &Arc<dyn BrowsingContext>,
    action: A,
    timeout: Duration,
    timings: &Timings,
) -> Option<Arc<dyn BrowsingContext>>
where
    A: Future<Output = ()>,
{
    let owner_id = owner.id();
    let before = context_ids(session).await;
    let mut popups = or_pending(owner.popup_events().await, "popup");
    let mut opened = or_pending(session.context_events().await, "context");

    action.await;

    let grace = timeout.min(ms(timings.popup_grace_ms));
    let mut popup = tokio::select! {
        Some(ctx) = popups.next() => Some(ctx),
        Some(ctx) = async {
            while let Some(ctx) = opened.next().await {
                if ctx.id() != owner_id {
                    return Some(ctx);
                }
            }
            None
        } => Some(ctx),
        _ = tokio::time::sleep(grace) => None,
    };

    if popup.is_none() {
        tokio::time::sleep(ms(timings.popup_diff_delay_ms)).await;
        if let Ok(after) = session.contexts().await {
            popup = after
                .into_iter()
                .rev()
                .find(|c| c.id() != owner_id && !before.contains(&c.id()));
            if popup.is_some() {
                debug!("New context found by diffing open contexts");
            }
        }
    }

    let popup = popup?;
    info!("Popup detected: {}", popup.id());
    if let Err(e) = popup
        .wait_for_load_state(LoadState::DomContentLoaded, ms(timings.popup_load_ms))
        .await
    {
        debug!("Popup content not loaded yet: {}", e);
    }
    settle(popup.as_ref(), ms(timings.popup_settle_ms), timings).await;
    Some(popup)
}
