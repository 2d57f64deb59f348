// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 6: an externally killed pane is observed on the next poll tick
//! and the session is marked completed, but the ticket's own state is left
//! alone — completion is never inferred from a pane dying.

use std::sync::Arc;
use std::time::Duration;

use sessions_core::model::{SessionStatus, TicketState};
use sessions_repository::{InMemoryRepository, SessionsRepository, TicketsRepository};
use sessions_specs::{build_engine, seed_project_and_ticket, ScriptedMultiplexer};

#[tokio::test(flavor = "multi_thread")]
async fn a_pane_killed_out_of_band_completes_the_session_without_touching_the_ticket() {
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
            if repo.get_session(session.id).await.expect("session exists").status == SessionStatus::Running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("session reaches running");

    multiplexer.kill();

    tokio::time::timeout(Duration::from_secs(8), async {
        loop {
            let refreshed = repo.get_session(session.id).await.expect("session exists");
            if refreshed.status == SessionStatus::Completed {
                return refreshed;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("session is completed after the pane dies");

    let refreshed = repo.get_session(session.id).await.expect("session exists");
    assert!(refreshed.ended_at.is_some());

    let unchanged_ticket = repo.get_ticket(ticket.id).await.expect("ticket exists");
    assert_eq!(unchanged_ticket.state, TicketState::InProgress);

    assert!(!engine.context_monitor.is_monitoring(session.id).await);
    assert!(engine.waiting_detector.get_waiting_state(session.id).await.is_err());
}
