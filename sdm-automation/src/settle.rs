use crate::config::{ms, Timings};
use crate::platforms::{BrowsingContext, LoadState};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Wait until the context answers a trivial script evaluation, bounded by `timeout`.
///
/// Never fails: the target application rarely reaches a quiet network state, so
/// callers proceed once this returns whether or not the context fully settled.
#[instrument(level = "debug", skip(context, timings), fields(context = %context.id()))]
pub async fn settle(context: &dyn BrowsingContext, timeout: Duration, timings: &Timings) {
    let start = Instant::now();
    let load_bound = timeout.min(ms(timings.settle_load_state_ms));

    for state in [LoadState::DomContentLoaded, LoadState::Load] {
        if let Err(e) = context.wait_for_load_state(state, load_bound).await {
            debug!("{:?} not observed: {}", state, e);
        }
    }

    while start.elapsed() < timeout {
        match context.ready_state().await {
            Ok(_) => return,
            Err(e) => {
                debug!("Context not responsive yet: {}", e);
                tokio::time::sleep(ms(timings.settle_poll_ms)).await;
            }
        }
    }
    debug!("Settle gave up after {:?}", timeout);
}
