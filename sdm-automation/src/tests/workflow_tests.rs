//! Search → ticket → workflow tab → task processing against the simulated desk.

use super::fake::World;
use super::sim::{detail_lifecycle, fast_config, Desk, TaskLinks, ASSIGNEE};
use crate::platforms::{BrowsingContext, Frame};
use crate::{
    find_task_anchor, open_workflow_tab, resolve_task_opener, Artifacts, AutomationError, Policy,
    ServiceDesk, StatusChange, TaskOpener, TaskOutcome, TaskStatus, Ticket,
};
use std::sync::Arc;

async fn open(desk: &Arc<Desk>) -> (ServiceDesk, Ticket, Arc<World>) {
    let (launcher, world) = desk.launcher();
    let service = ServiceDesk::launch(&launcher, fast_config()).await.unwrap();
    service.open_search().await;
    let ticket = service.open_ticket("846349", Some("go_cr")).await.unwrap();
    (service, ticket, world)
}

fn tasks(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[tokio::test]
async fn pending_task_completed_and_complete_task_left_alone() {
    for policy in [Policy::Lenient, Policy::Strict] {
        let desk = Desk::new(&[("200", "PEND"), ("250", "COMP")]);
        let (launcher, world) = desk.launcher();
        let service = ServiceDesk::launch(&launcher, fast_config()).await.unwrap();
        service.open_search().await;

        let outcomes = service
            .run_ticket("846349", Some("go_cr"), &tasks(&["200", "250"]), policy, None)
            .await
            .unwrap();

        assert_eq!(
            outcomes,
            vec![
                TaskOutcome::processed("200", Some(StatusChange::Completed)),
                TaskOutcome::processed("250", Some(StatusChange::Unchanged)),
            ],
            "policy {policy:?}"
        );
        assert_eq!(desk.task("200").status, "COMP");
        assert_eq!(desk.task("200").assignee, ASSIGNEE);
        assert_eq!(desk.task("250").status, "COMP");

        // ticket and detail popups are all gone; only the home page remains
        let open: Vec<String> = world
            .open_contexts()
            .iter()
            .map(|c| c.label().to_string())
            .collect();
        assert_eq!(open, vec!["home".to_string()]);

        service.close().await.unwrap();
        assert!(world.session_closed());
    }
}

#[tokio::test]
async fn search_fills_key_and_ticket_type() {
    let desk = Desk::new(&[("200", "PEND")]);
    let (_service, _ticket, world) = open(&desk).await;
    let log = world.log();
    assert!(log.iter().any(|l| l == "goto http://desk.test/"));
    assert!(log.iter().any(|l| l.ends_with("/search=846349")));
    assert!(log.iter().any(|l| l.starts_with("click home/product/go")));
}

#[tokio::test]
async fn search_without_ticket_type_keeps_page_selection() {
    let desk = Desk::new(&[("200", "PEND")]);
    let (launcher, world) = desk.launcher();
    let service = ServiceDesk::launch(&launcher, fast_config()).await.unwrap();
    service.open_search().await;
    service.open_ticket("846349", None).await.unwrap();

    let home = world
        .all_contexts()
        .into_iter()
        .find(|c| c.label() == "home")
        .unwrap();
    let selected = home.element("ticket_type").and_then(|e| e.select).unwrap();
    assert_eq!(selected.value, "in");
}

#[tokio::test]
async fn unknown_tasks_are_never_fabricated() {
    let desk = Desk::new(&[("200", "PEND"), ("250", "COMP")]);
    let (service, mut ticket, _world) = open(&desk).await;
    let timings = service.config().timings.clone();

    for missing in ["999", "20", "2000", "25"] {
        assert!(find_task_anchor(ticket.popup().as_ref(), missing, None)
            .await
            .is_none());
        assert!(resolve_task_opener(
            ticket.popup().as_ref(),
            missing,
            Some(ticket.workflow_frame()),
            &timings
        )
        .await
        .is_none());
    }

    let outcome = ticket.process_task("999", Policy::Lenient, None).await;
    assert_eq!(outcome.status, TaskStatus::AnchorNotFound);
    assert_eq!(desk.detail_opens.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn hidden_task_link_opens_through_row_function() {
    let desk = Desk::build(&[("200", "PEND"), ("250", "PEND")], |d| {
        d.task_links = TaskLinks::Hidden
    });
    let (service, mut ticket, world) = open(&desk).await;

    let opener = resolve_task_opener(
        ticket.popup().as_ref(),
        "250",
        Some(ticket.workflow_frame()),
        &service.config().timings,
    )
    .await
    .unwrap();
    assert!(!opener.is_click());
    assert!(matches!(opener, TaskOpener::RowFunction { row: 1, .. }));

    let outcome = ticket.process_task("250", Policy::Lenient, None).await;
    assert_eq!(
        outcome,
        TaskOutcome::processed("250", Some(StatusChange::Completed))
    );
    assert_eq!(desk.task("250").status, "COMP");
    assert_eq!(desk.task("200").status, "PEND");
    let log = world.log();
    assert!(log.iter().any(|l| l.starts_with("call do_default(1)")), "{log:?}");
    assert!(!log.iter().any(|l| l.starts_with("click ticket/") && l.ends_with("/task")));
}

#[tokio::test]
async fn failed_link_click_falls_back_to_row_function() {
    let desk = Desk::build(&[("200", "PEND")], |d| d.task_links = TaskLinks::Broken);
    let (_service, mut ticket, world) = open(&desk).await;

    let outcome = ticket.process_task_with_retry("200", None).await;
    assert_eq!(
        outcome,
        TaskOutcome::processed("200", Some(StatusChange::Completed))
    );
    assert_eq!(desk.task("200").assignee, ASSIGNEE);
    assert_eq!(desk.detail_opens.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(world.log().iter().any(|l| l.starts_with("call do_default(0)")));
}

#[tokio::test]
async fn strict_retry_recovers_after_two_failed_saves() {
    let desk = Desk::build(&[("200", "PEND")], |d| *d.failing_saves.get_mut() = 2);
    let (_service, mut ticket, world) = open(&desk).await;

    let outcome = ticket.process_task_with_retry("200", None).await;
    assert_eq!(
        outcome,
        TaskOutcome::processed("200", Some(StatusChange::Completed))
    );
    assert_eq!(desk.task("200").status, "COMP");

    // each partial detail popup is closed before the next one opens
    let lifecycle = detail_lifecycle(&world.log());
    assert_eq!(lifecycle.len(), 6, "{lifecycle:?}");
    for pair in lifecycle.chunks(2) {
        assert!(pair[0].starts_with("open detail:200#"), "{lifecycle:?}");
        assert_eq!(pair[1], pair[0].replacen("open", "close", 1));
    }
}

#[tokio::test]
async fn strict_retry_gives_up_after_three_attempts() {
    let desk = Desk::build(&[("200", "PEND")], |d| *d.failing_saves.get_mut() = 5);
    let (_service, mut ticket, world) = open(&desk).await;

    let outcome = ticket.process_task_with_retry("200", None).await;
    assert_eq!(outcome.status, TaskStatus::SaveError);
    assert!(outcome.message.is_some());
    assert_eq!(desk.detail_opens.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert_eq!(desk.task("200").status, "PEND");
    assert!(world
        .open_contexts()
        .iter()
        .all(|c| !c.label().starts_with("detail:")));
}

#[tokio::test]
async fn lenient_failure_surfaces_first_failed_step() {
    let desk = Desk::build(&[("200", "PEND")], |d| *d.failing_saves.get_mut() = 1);
    let (_service, mut ticket, _world) = open(&desk).await;

    let outcome = ticket.process_task("200", Policy::Lenient, None).await;
    assert_eq!(outcome.status, TaskStatus::SaveError);
    assert_eq!(outcome.status_change, Some(StatusChange::Completed));
}

#[tokio::test]
async fn discovers_numeric_tasks_sorted() {
    let desk = Desk::new(&[("250", "COMP"), ("200", "PEND"), ("notes", "PEND")]);
    let (_service, ticket, _world) = open(&desk).await;
    assert_eq!(ticket.discover_tasks().await, vec!["200", "250"]);
}

#[tokio::test]
async fn row_precheck_skips_tasks_that_are_not_pending() {
    let desk = Desk::new(&[("200", "PEND"), ("250", "COMP"), ("300", "HOLD")]);
    let (_service, ticket, _world) = open(&desk).await;

    assert_eq!(ticket.skip_reason("200").await, None);
    assert_eq!(
        ticket.skip_reason("250").await.as_deref(),
        Some("Status is COMPLETE")
    );
    assert_eq!(
        ticket.skip_reason("300").await.as_deref(),
        Some("Status is ON HOLD")
    );
    assert_eq!(ticket.skip_reason("999").await, None);
}

#[tokio::test]
async fn reopening_an_active_workflow_tab_clicks_nothing() {
    let desk = Desk::new(&[("200", "PEND")]);
    let (service, ticket, world) = open(&desk).await;
    let clicks = |log: &[String]| log.iter().filter(|l| l.starts_with("click ticket/")).count();
    let before = clicks(&world.log());
    assert_eq!(before, 2, "accordion and tab clicked once each");

    let frame = open_workflow_tab(ticket.popup().as_ref(), &service.config().timings)
        .await
        .unwrap();
    assert_eq!(frame.name(), crate::target::WORKFLOW_FRAME_NAME);
    assert_eq!(clicks(&world.log()), before);
}

#[tokio::test]
async fn missing_search_form_is_search_unavailable() {
    let desk = Desk::build(&[("200", "PEND")], |d| d.search_form = false);
    let (launcher, _world) = desk.launcher();
    let service = ServiceDesk::launch(&launcher, fast_config()).await.unwrap();

    let result = service.open_ticket("846349", None).await;
    assert!(matches!(result, Err(AutomationError::SearchUnavailable(_))));
}

#[tokio::test]
async fn go_without_popup_is_no_popup() {
    let desk = Desk::build(&[("200", "PEND")], |d| d.go_opens_ticket = false);
    let (launcher, _world) = desk.launcher();
    let service = ServiceDesk::launch(&launcher, fast_config()).await.unwrap();

    let result = service.open_ticket("846349", None).await;
    assert!(matches!(result, Err(AutomationError::NoPopup(_))));
}

#[tokio::test]
async fn closing_a_ticket_closes_its_popup() {
    let desk = Desk::new(&[("200", "PEND")]);
    let (_service, ticket, world) = open(&desk).await;
    let popup = ticket.popup().clone();
    ticket.close().await;
    assert!(popup.is_closed().await);
    assert!(world.open_contexts().iter().all(|c| c.label() == "home"));
}

#[tokio::test]
async fn audit_artifacts_are_written_per_task() {
    let desk = Desk::new(&[("200", "PEND")]);
    let (launcher, _world) = desk.launcher();
    let service = ServiceDesk::launch(&launcher, fast_config()).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let artifacts = Artifacts::new(dir.path(), "846349", service.config().timings.clone());

    let outcomes = service
        .run_ticket("846349", None, &tasks(&["200"]), Policy::Lenient, Some(&artifacts))
        .await
        .unwrap();
    assert!(outcomes[0].is_processed());

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    for suffix in [
        "_Popup_Top.html",
        "_Popup_Top.png",
        "_Task_200_Before.html",
        "_Task_200_Before.png",
        "_Task_200_After.html",
        "_Task_200_After.png",
    ] {
        assert!(
            names.iter().any(|n| n.starts_with("OPEN_846349_") && n.ends_with(suffix)),
            "missing {suffix} in {names:?}"
        );
    }
    assert!(names
        .iter()
        .any(|n| n.contains(&format!("_Popup_Frame_1_{}", crate::target::WORKFLOW_FRAME_NAME))));
}
