//! Integration tests for deployment actions
//!
//! Tests the flow: run_action -> mock trigger -> read-only session -> lock release

use stackdeck::transport::mock::{wait_for, MockActions, MockStream};
use stackdeck::transport::{StreamMessage, TransportError};
use stackdeck::{ActionError, DeployAction, SessionError};

use super::common::{strip_ansi, DoneCounter, Harness, WAIT};

/// Two messages then completion: cache holds both, lock released, callback once
#[tokio::test]
async fn test_action_runs_to_completion() {
    let harness = Harness::new(MockActions::scripted(
        MockStream::new().with_messages(["Creating network", "Starting web"]),
    ));
    let done = DoneCounter::default();

    let id = harness
        .manager
        .run_action("stack.yaml", DeployAction::Up, &[], done.callback())
        .unwrap();
    let snapshot = harness.manager.wait_for_end(&id).await.unwrap();

    assert!(wait_for(|| done.count() == 1, WAIT).await);
    assert_eq!(snapshot.cache.len(), 2);
    assert_eq!(snapshot.title, "stack.yaml-up");
    assert!(snapshot.error.is_none());
    assert!(harness.manager.active_action().is_none());

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(done.count(), 1);
}

/// A second action while one is running is rejected and leaves the first alone
#[tokio::test]
async fn test_concurrent_action_rejected() {
    let harness = Harness::new(MockActions::channel());

    let up = harness
        .manager
        .run_action("stack.yaml", DeployAction::Up, &[], || {})
        .unwrap();
    let rejected = harness
        .manager
        .run_action("stack.yaml", DeployAction::Restart, &[], || {});

    match rejected {
        Err(SessionError::Action(ActionError::Busy { requested, active })) => {
            assert_eq!(requested, DeployAction::Restart);
            assert_eq!(active, DeployAction::Up);
        }
        other => panic!("Expected Busy, got {:?}", other),
    }
    assert_eq!(harness.manager.active_action(), Some(DeployAction::Up));
    assert_eq!(harness.manager.sessions().len(), 1);

    let controller = harness.actions().controller(0).unwrap();
    controller.send("Recreating web");
    controller.finish();
    let snapshot = harness.manager.wait_for_end(&up).await.unwrap();
    assert_eq!(snapshot.cached_text(), vec!["Recreating web"]);
    assert!(wait_for(|| harness.manager.active_action().is_none(), WAIT).await);
}

/// An application error record ends the run with a visible error marker
#[tokio::test]
async fn test_action_error_record_shown_inline() {
    let harness = Harness::new(MockActions::scripted(
        MockStream::new()
            .with_messages(["Pulling web"])
            .with_record(StreamMessage::failure("image not found"))
            .with_messages(["never shown"]),
    ));

    let id = harness
        .manager
        .run_action("stack.yaml", DeployAction::Update, &["web".to_string()], || {})
        .unwrap();
    let terminal = harness.attach(&id);
    let snapshot = harness.manager.wait_for_end(&id).await.unwrap();

    assert_eq!(snapshot.cached_text(), vec!["Pulling web"]);
    assert_eq!(snapshot.error.as_deref(), Some("image not found"));
    assert!(strip_ansi(&terminal.contents()).contains("[error] image not found"));
    assert!(wait_for(|| harness.manager.active_action().is_none(), WAIT).await);
}

/// Cancelling a running action closes its session without an error
#[tokio::test]
async fn test_cancel_action() {
    let harness = Harness::new(MockActions::channel());
    let done = DoneCounter::default();

    let id = harness
        .manager
        .run_action("stack.yaml", DeployAction::Down, &[], done.callback())
        .unwrap();
    let terminal = harness.attach(&id);
    let controller = harness.actions().controller(0).unwrap();
    assert!(wait_for(|| controller.started(), WAIT).await);

    assert!(harness.manager.cancel_action("user pressed stop"));
    let snapshot = harness.manager.wait_for_end(&id).await.unwrap();

    assert!(snapshot.error.is_none());
    assert!(wait_for(|| done.count() == 1, WAIT).await);
    assert_eq!(controller.cancellations(), 1);
    assert!(strip_ansi(&terminal.contents()).contains("[stream cancelled]"));
    assert!(!harness.manager.cancel_action("again"));
}

/// Failure of the transport releases the lock so the next action can run
#[tokio::test]
async fn test_failed_action_allows_retry() {
    let harness = Harness::new(MockActions::scripted(
        MockStream::new().failing_with(TransportError::Connect("connection refused".into())),
    ));

    let first = harness
        .manager
        .run_action("stack.yaml", DeployAction::Start, &[], || {})
        .unwrap();
    let snapshot = harness.manager.wait_for_end(&first).await.unwrap();
    assert!(snapshot.error.unwrap().contains("connection refused"));
    assert!(wait_for(|| harness.manager.active_action().is_none(), WAIT).await);

    let second = harness
        .manager
        .run_action("stack.yaml", DeployAction::Start, &[], || {})
        .unwrap();
    assert_ne!(first, second);
    harness.manager.wait_for_end(&second).await;

    let titles: Vec<_> = harness
        .manager
        .sessions()
        .into_iter()
        .map(|s| s.title)
        .collect();
    assert_eq!(titles, vec!["stack.yaml-start"]);
    assert_eq!(harness.actions().calls().len(), 2);
}

/// After a run exactly one tab carries the action's title
#[tokio::test]
async fn test_action_replaces_all_same_titled_tabs() {
    let harness = Harness::new(MockActions::scripted(MockStream::new().with_messages(["ok"])));
    for _ in 0..2 {
        harness
            .manager
            .open_log_session("stack.yaml-up", "/api/logs/stack")
            .unwrap();
    }

    let id = harness
        .manager
        .run_action("stack.yaml", DeployAction::Up, &[], || {})
        .unwrap();
    harness.manager.wait_for_end(&id).await.unwrap();

    let titled: Vec<_> = harness
        .manager
        .sessions()
        .into_iter()
        .filter(|s| s.title == "stack.yaml-up")
        .map(|s| s.id)
        .collect();
    assert_eq!(titled, vec![id]);
}
