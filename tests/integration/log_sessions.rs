//! Integration tests for log sessions
//!
//! Tests the flow: open_log_session -> mock stream -> cache -> terminal

use stackdeck::transport::mock::{channel_stream, wait_for, MockActions, MockStream};
use stackdeck::transport::TransportError;
use stackdeck::Chunk;

use super::common::{strip_ansi, Harness, WAIT};

#[tokio::test]
async fn test_log_lines_cached_in_order() {
    let harness = Harness::new(MockActions::channel());
    harness.streams.queue_log(
        MockStream::new()
            .with_messages(["one", "two", "three"])
            .with_delay(std::time::Duration::from_millis(1))
            .into_call(),
    );

    let id = harness
        .manager
        .open_log_session("web", "/api/logs/web")
        .unwrap();
    let snapshot = harness.manager.wait_for_end(&id).await.unwrap();

    assert_eq!(snapshot.cached_text(), vec!["one", "two", "three"]);
    assert!(!snapshot.interactive);
    assert!(snapshot.error.is_none());
}

/// Closing a live log session cancels the transport once and removes it
#[tokio::test]
async fn test_close_before_completion() {
    let harness = Harness::new(MockActions::channel());
    let (call, controller) = channel_stream();
    harness.streams.queue_log(call);

    let id = harness
        .manager
        .open_log_session("web", "/api/logs/web")
        .unwrap();
    controller.send("first line");
    assert!(
        wait_for(
            || harness.manager.session(&id).is_some_and(|s| s.cache.len() == 1),
            WAIT
        )
        .await
    );

    harness.manager.close_session(&id).unwrap();
    assert!(harness.manager.session(&id).is_none());
    assert!(wait_for(|| controller.cancellations() == 1, WAIT).await);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!controller.send("after close"));
    assert!(harness.manager.session(&id).is_none());
    assert_eq!(controller.cancellations(), 1);
}

/// Reattaching a terminal replays everything received while detached
#[tokio::test]
async fn test_reattach_replays_cache() {
    let harness = Harness::new(MockActions::channel());
    let (call, controller) = channel_stream();
    harness.streams.queue_log(call);

    let id = harness
        .manager
        .open_log_session("web", "/api/logs/web")
        .unwrap();
    let first = harness.attach(&id);
    controller.send("while attached");
    assert!(wait_for(|| first.writes().len() == 1, WAIT).await);

    harness.manager.detach_terminal(&id);
    controller.send("while detached");
    assert!(
        wait_for(
            || harness.manager.session(&id).is_some_and(|s| s.cache.len() == 2),
            WAIT
        )
        .await
    );
    assert_eq!(first.writes().len(), 1);

    let second = harness.attach(&id);
    assert_eq!(
        second.writes(),
        vec![Chunk::from("while attached"), Chunk::from("while detached")]
    );
    assert!(second.fit_count() >= 1);
    assert!(second.focus_count() >= 1);
}

#[tokio::test]
async fn test_stream_failure_marks_session() {
    let harness = Harness::new(MockActions::channel());
    harness.streams.queue_log(
        MockStream::new()
            .with_messages(["partial"])
            .failing_with(TransportError::Stream("unexpected eof".into()))
            .into_call(),
    );

    let id = harness
        .manager
        .open_log_session("web", "/api/logs/web")
        .unwrap();
    let terminal = harness.attach(&id);
    let snapshot = harness.manager.wait_for_end(&id).await.unwrap();

    assert_eq!(snapshot.cached_text(), vec!["partial"]);
    assert_eq!(snapshot.error.as_deref(), Some("stream error: unexpected eof"));
    assert!(strip_ansi(&terminal.contents()).contains("[error] stream error: unexpected eof"));
}

/// Output for a background tab flags it until the tab is selected
#[tokio::test]
async fn test_background_tab_needs_attention() {
    let harness = Harness::new(MockActions::channel());
    let (first_call, first) = channel_stream();
    let (second_call, _second) = channel_stream();
    harness.streams.queue_log(first_call);
    harness.streams.queue_log(second_call);

    let a = harness.manager.open_log_session("a", "/api/logs/a").unwrap();
    let _b = harness.manager.open_log_session("b", "/api/logs/b").unwrap();

    first.send("background output");
    assert!(
        wait_for(
            || harness.manager.session(&a).is_some_and(|s| s.needs_attention),
            WAIT
        )
        .await
    );

    harness.manager.set_active(&a).unwrap();
    assert!(!harness.manager.session(&a).unwrap().needs_attention);
}
