// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 5: input before subscribing is rejected, subscribing replays a
//! bounded buffer, and input after subscribing is forwarded to the pane
//! with no reply. Also covers the `session:input` length boundary named
//! alongside it.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use sessions_repository::{InMemoryRepository, SessionsRepository};
use sessions_specs::{build_engine, seed_project_and_ticket, ScriptedMultiplexer};

async fn running_session_server() -> (TestServer, Arc<ScriptedMultiplexer>, sessions_core::ids::SessionId) {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = Arc::new(InMemoryRepository::new());
    let multiplexer = Arc::new(ScriptedMultiplexer::new());
    let (project, ticket) = seed_project_and_ticket(&repo, dir.path().to_str().expect("utf8 path")).await;

    let engine = build_engine(repo.clone(), multiplexer.clone(), dir.path());
    engine.start().await.expect("engine starts");

    let session = engine
        .start_ticket_session(project.id, ticket.id, None, None, vec![])
        .await
        .expect("start ticket session");

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if repo.get_session(session.id).await.expect("session exists").status
                == sessions_core::model::SessionStatus::Running
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("session reaches running");

    // Give the session more than 100 lines of scrollback so the subscribe
    // reply's replay buffer can be checked against its cap.
    for i in 0..150 {
        multiplexer.append_capture("%1", &format!("line {i}")).await;
    }
    tokio::time::sleep(Duration::from_millis(150)).await;
    drop(dir);

    let server = TestServer::builder().http_transport().build(engine.router()).expect("test server");
    (server, multiplexer, session.id)
}

#[tokio::test(flavor = "multi_thread")]
async fn input_before_subscribe_is_rejected_then_subscribe_replays_a_bounded_buffer_then_input_is_forwarded() {
    let (server, multiplexer, session_id) = running_session_server().await;
    let mut socket = server.get_websocket("/ws").await.into_websocket().await;

    socket
        .send_text(format!(r#"{{"type":"session:input","payload":{{"sessionId":"{session_id}","text":"hello"}}}}"#))
        .await;
    let reply: serde_json::Value = socket.receive_json().await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["code"], "NOT_SUBSCRIBED");

    socket.send_text(format!(r#"{{"type":"session:subscribe","payload":{{"sessionId":"{session_id}"}}}}"#)).await;
    let reply: serde_json::Value = socket.receive_json().await;
    assert_eq!(reply["type"], "subscribed");
    let buffer_lines = reply["payload"]["bufferLines"].as_array().expect("buffer lines array");
    assert!(buffer_lines.len() <= 100);

    socket
        .send_text(format!(r#"{{"type":"session:input","payload":{{"sessionId":"{session_id}","text":"hello"}}}}"#))
        .await;

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if multiplexer.sent_texts().await.iter().any(|(_, text)| text == "hello") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("input forwarded to the pane");
}

#[tokio::test(flavor = "multi_thread")]
async fn session_input_text_length_boundary_at_ten_thousand_characters() {
    let (server, _multiplexer, session_id) = running_session_server().await;
    let mut socket = server.get_websocket("/ws").await.into_websocket().await;

    socket.send_text(format!(r#"{{"type":"session:subscribe","payload":{{"sessionId":"{session_id}"}}}}"#)).await;
    let _subscribed: serde_json::Value = socket.receive_json().await;

    let over_limit = "a".repeat(10_001);
    socket.send_text(format!(
        r#"{{"type":"session:input","payload":{{"sessionId":"{session_id}","text":"{over_limit}"}}}}"#
    ))
    .await;
    let reply: serde_json::Value = socket.receive_json().await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["code"], "INVALID_MESSAGE");

    let at_limit = "a".repeat(10_000);
    socket
        .send_text(format!(r#"{{"type":"session:input","payload":{{"sessionId":"{session_id}","text":"{at_limit}"}}}}"#))
        .await;
    socket.send_text(r#"{"type":"ping"}"#).await;
    let reply: serde_json::Value = socket.receive_json().await;
    assert_eq!(reply["type"], "pong", "the accepted input produced no reply; only the following ping did");
}
