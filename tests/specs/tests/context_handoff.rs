// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 2: a context reading that crosses the threshold triggers the
//! full auto-handoff choreography through the engine's own wiring, with no
//! extra glue beyond assembling the engine and writing telemetry.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use sessions_core::model::SessionStatus;
use sessions_repository::{InMemoryRepository, HandoffEventsRepository, NotificationsRepository, SessionsRepository};
use sessions_specs::{build_engine, seed_project_and_ticket, ScriptedMultiplexer};

#[tokio::test(flavor = "multi_thread")]
async fn context_threshold_triggers_automatic_handoff_to_a_fresh_session() {
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

    // The assistant's reply to the orchestrator's own "/exportHandoff" is
    // simulated by writing the handoff file shortly after it's sent.
    let handoff_path = dir.path().join(".handoff.json");
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(&handoff_path, "{}").expect("write handoff file");
    });

    let telemetry_dir = dir.path().join("telemetry");
    std::fs::create_dir_all(&telemetry_dir).expect("create telemetry dir");
    let telemetry_path = telemetry_dir.join(format!("{}.jsonl", session.id));
    std::fs::write(&telemetry_path, "").expect("create empty telemetry file");

    let mut telemetry_file = OpenOptions::new().append(true).open(&telemetry_path).expect("open telemetry file");
    writeln!(telemetry_file, r#"{{"timestamp":1,"event_kind":"context","context_remaining_percent":22}}"#)
        .expect("write telemetry line");
    tokio::time::sleep(Duration::from_millis(200)).await;
    writeln!(telemetry_file, r#"{{"timestamp":2,"event_kind":"context","context_remaining_percent":19}}"#)
        .expect("write telemetry line");
    drop(telemetry_file);

    let mut handoff_events = engine.handoff_orchestrator.subscribe();
    let (from_session_id, to_session_id) = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            match handoff_events.recv().await.expect("handoff event channel open") {
                sessions_handoff::HandoffNotice::Completed { from_session_id, to_session_id, .. } => {
                    return (from_session_id, to_session_id);
                }
                sessions_handoff::HandoffNotice::Failed { reason, .. } => {
                    panic!("handoff failed: {reason}");
                }
                _ => continue,
            }
        }
    })
    .await
    .expect("handoff completes");

    assert_eq!(from_session_id, session.id);

    let events = repo.list_handoff_events(Some(session.id)).await.expect("list handoff events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].to_session_id, to_session_id);
    assert_eq!(events[0].context_at_handoff, 19);

    let notifications = repo.list_notifications(None).await.expect("list notifications");
    assert!(notifications
        .iter()
        .any(|n| n.notification_type == sessions_core::model::NotificationType::HandoffComplete
            && n.session_id == Some(to_session_id)));

    let new_session = repo.get_session(to_session_id).await.expect("new session exists");
    assert_eq!(new_session.parent_session_id, Some(session.id));
    assert_eq!(new_session.ticket_id, Some(ticket.id));
}
