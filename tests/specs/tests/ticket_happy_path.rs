// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 1: starting a ticket session advances the ticket, delivers the
//! initial prompt, and a waiting prompt in the pane's output eventually
//! surfaces as a persisted `waiting_input` notification.

use std::sync::Arc;
use std::time::Duration;

use sessions_core::model::{SessionStatus, TicketState};
use sessions_repository::{InMemoryRepository, NotificationsRepository, SessionsRepository, TicketsRepository};
use sessions_specs::{build_engine, seed_project_and_ticket, ScriptedMultiplexer};

#[tokio::test(flavor = "multi_thread")]
async fn starting_a_ticket_session_runs_the_prompt_and_fires_a_waiting_notification() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = Arc::new(InMemoryRepository::new());
    let multiplexer = Arc::new(ScriptedMultiplexer::new());
    let (project, ticket) = seed_project_and_ticket(&repo, dir.path().to_str().expect("utf8 path")).await;

    let engine = build_engine(repo.clone(), multiplexer.clone(), dir.path());
    engine.start().await.expect("engine starts");

    let session = engine
        .start_ticket_session(project.id, ticket.id, Some("begin the ticket".into()), None, vec![])
        .await
        .expect("start ticket session");

    let updated_ticket = repo.get_ticket(ticket.id).await.expect("ticket exists");
    assert_eq!(updated_ticket.state, TicketState::InProgress);

    // The poll loop's first tick sends the initial prompt and transitions
    // the session to running.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if repo.get_session(session.id).await.expect("session exists").status == SessionStatus::Running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("session reaches running");

    let sent = multiplexer.sent_texts().await;
    assert!(sent.iter().any(|(_, text)| text == "begin the ticket"));

    multiplexer.append_capture("%1", "running the build").await;
    multiplexer.append_capture("%1", "Do you want to proceed?").await;

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let notifications = repo.list_notifications(None).await.expect("list notifications");
            if notifications.iter().any(|n| n.session_id == Some(session.id)) {
                return notifications;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("waiting notification is persisted");

    let state = engine.waiting_detector.get_waiting_state(session.id).await.expect("session is watched");
    assert!(state.waiting);
}
