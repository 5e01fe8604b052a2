//! Popup catcher against every way a new context can (or cannot) be announced.

use super::fake::{Announce, Effect, Element, FakeSession, FrameSpec, PageSpec, World};
use crate::platforms::{BrowserSession, BrowsingContext};
use crate::{run_and_catch_popup, Selector, Timings};
use std::sync::Arc;
use std::time::Duration;

fn opener_world(announce: Option<Announce>) -> Arc<World> {
    World::new(Arc::new(move || {
        let mut button = Element::new("open", &["button"], "Open");
        if let Some(announce) = announce {
            button = button.on_click(Effect::Open {
                page: Arc::new(|| PageSpec::new("target", vec![FrameSpec::new("", "http://x/")])),
                announce,
            });
        }
        PageSpec::new("owner", vec![FrameSpec::new("", "http://owner/").with(button)])
    }))
}

async fn click_and_catch(announce: Option<Announce>) -> (Option<String>, Arc<World>) {
    let world = opener_world(announce);
    let session = FakeSession::new(world.clone());
    let owner = session.new_context().await.unwrap();
    let frame = owner.main_frame().await.unwrap();
    let timings = Timings::default().scaled(0.01);

    let action = async {
        frame
            .click(&Selector::css("button"), Duration::from_millis(50))
            .await
            .unwrap();
    };
    let caught = tokio::time::timeout(
        Duration::from_secs(5),
        run_and_catch_popup(&session, &owner, action, Duration::from_millis(300), &timings),
    )
    .await
    .expect("popup catcher must not block past its timeout");

    let label = match caught {
        Some(context) => {
            let id = context.id();
            world
                .all_contexts()
                .into_iter()
                .find(|c| c.id() == id)
                .map(|c| c.label().to_string())
        }
        None => None,
    };
    (label, world)
}

#[tokio::test]
async fn action_opening_nothing_yields_none() {
    let (caught, world) = click_and_catch(None).await;
    assert_eq!(caught, None);
    assert_eq!(world.all_contexts().len(), 1);
}

#[tokio::test]
async fn catches_popup_of_owner() {
    let (caught, _) = click_and_catch(Some(Announce::Popup)).await;
    assert_eq!(caught.as_deref(), Some("target"));
}

#[tokio::test]
async fn catches_context_announced_only_on_session() {
    let (caught, _) = click_and_catch(Some(Announce::Session)).await;
    assert_eq!(caught.as_deref(), Some("target"));
}

#[tokio::test]
async fn finds_unannounced_context_by_diffing() {
    let (caught, _) = click_and_catch(Some(Announce::Silent)).await;
    assert_eq!(caught.as_deref(), Some("target"));
}

#[tokio::test]
async fn preexisting_contexts_are_not_mistaken_for_popups() {
    let world = opener_world(None);
    let session = FakeSession::new(world.clone());
    let owner = session.new_context().await.unwrap();
    let _other = session.new_context().await.unwrap();
    let timings = Timings::default().scaled(0.01);

    let caught =
        run_and_catch_popup(&session, &owner, async {}, Duration::from_millis(100), &timings).await;
    assert!(caught.is_none());
}
