//! Integration tests for socket sessions
//!
//! Tests the flow: open_exec_session -> mock socket -> input/output -> close

use stackdeck::transport::mock::wait_for;
use stackdeck::transport::mock::MockActions;
use stackdeck::transport::Frame;
use stackdeck::{Chunk, SessionError};

use super::common::{strip_ansi, Harness, WAIT};

/// Input reaches the socket exactly once while open, never after close
#[tokio::test]
async fn test_input_sent_once_while_open() {
    let harness = Harness::new(MockActions::channel());
    let socket = harness.connector.socket();

    let id = harness
        .manager
        .open_exec_session("web shell", "/exec/web", true)
        .unwrap();
    assert!(
        wait_for(
            || harness.manager.send_input(&id, "ls\n").unwrap_or(false),
            WAIT
        )
        .await
    );
    assert!(wait_for(|| socket.sent_text().len() == 1, WAIT).await);

    socket.close();
    harness.manager.wait_for_end(&id).await.unwrap();
    assert!(!harness.manager.send_input(&id, "pwd\n").unwrap());

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(socket.sent_text(), vec!["ls\n"]);
}

#[tokio::test]
async fn test_output_and_close_marker() {
    let harness = Harness::new(MockActions::channel());
    let socket = harness.connector.socket();

    let id = harness
        .manager
        .open_exec_session("web shell", "/exec/web", true)
        .unwrap();
    let terminal = harness.attach(&id);
    socket.push_text("root@web:/# ");
    socket.push_binary(b"\x1b[0m".to_vec());
    socket.hang_up();

    let snapshot = harness.manager.wait_for_end(&id).await.unwrap();
    assert_eq!(
        snapshot.cache,
        vec![
            Chunk::from("root@web:/# "),
            Chunk::Binary(b"\x1b[0m".to_vec())
        ]
    );
    assert!(snapshot.error.is_none());
    assert!(strip_ansi(&terminal.contents()).ends_with("[connection closed]\r\n"));
}

/// Read-only attach sessions refuse input
#[tokio::test]
async fn test_read_only_attach() {
    let harness = Harness::new(MockActions::channel());
    let socket = harness.connector.socket();

    let id = harness
        .manager
        .open_exec_session("web attach", "/attach/web", false)
        .unwrap();
    socket.push_text("tail output");
    assert!(
        wait_for(
            || harness.manager.session(&id).is_some_and(|s| s.cache.len() == 1),
            WAIT
        )
        .await
    );

    assert!(matches!(
        harness.manager.send_input(&id, "ls\n"),
        Err(SessionError::NotInteractive(_))
    ));
}

/// Closing a socket session sends a close frame and drops the tab
#[tokio::test]
async fn test_close_session_closes_socket() {
    let harness = Harness::new(MockActions::channel());
    let socket = harness.connector.socket();

    let id = harness
        .manager
        .open_exec_session("web shell", "/exec/web", true)
        .unwrap();
    let sink = harness.manager.registry().input_sink(&id).unwrap();
    assert!(wait_for(|| sink.is_open(), WAIT).await);

    harness.manager.close_session(&id).unwrap();
    assert!(harness.manager.sessions().is_empty());
    assert!(wait_for(|| socket.sent() == vec![Frame::Close], WAIT).await);
    assert!(wait_for(|| !sink.is_open(), WAIT).await);
}

#[tokio::test]
async fn test_refused_socket_reports_error() {
    let harness = Harness::new(MockActions::channel());
    harness.connector.refuse("connection refused");

    let id = harness
        .manager
        .open_exec_session("web shell", "/exec/web", true)
        .unwrap();
    let terminal = harness.attach(&id);
    let snapshot = harness.manager.wait_for_end(&id).await.unwrap();

    let error = snapshot.error.unwrap();
    assert!(error.contains("connection refused"));
    assert!(strip_ansi(&terminal.contents()).contains("[error] connection failed"));
    assert_eq!(harness.connector.urls(), vec!["/exec/web"]);
}
