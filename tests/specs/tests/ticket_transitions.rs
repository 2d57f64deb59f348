// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 3 (reject with feedback) and Scenario 4 (invalid transition),
//! driven through a fully-assembled engine's ticket workflow rather than
//! the workflow's own isolated test double.

use std::sync::Arc;

use sessions_core::model::{TicketState, TransitionReason, TransitionTrigger};
use sessions_repository::{InMemoryRepository, TicketsRepository};
use sessions_specs::{build_engine, seed_project_and_ticket, ScriptedMultiplexer};

#[tokio::test(flavor = "multi_thread")]
async fn rejecting_a_ticket_in_review_formats_feedback_and_returns_it_to_in_progress() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = Arc::new(InMemoryRepository::new());
    let multiplexer = Arc::new(ScriptedMultiplexer::new());
    let (project, ticket) = seed_project_and_ticket(&repo, dir.path().to_str().expect("utf8 path")).await;

    let engine = build_engine(repo.clone(), multiplexer.clone(), dir.path());
    engine.start().await.expect("engine starts");

    engine
        .start_ticket_session(project.id, ticket.id, None, None, vec![])
        .await
        .expect("start ticket session");

    engine
        .ticket_workflow
        .transition(ticket.id, TicketState::Review, TransitionTrigger::Auto, TransitionReason::CompletionDetected, None, None)
        .await
        .expect("ticket reaches review");

    let rejected = engine
        .ticket_workflow
        .transition(
            ticket.id,
            TicketState::InProgress,
            TransitionTrigger::Manual,
            TransitionReason::UserRejected,
            None,
            Some("please add tests".into()),
        )
        .await
        .expect("reject transition");

    assert_eq!(rejected.state, TicketState::InProgress);
    assert_eq!(
        rejected.rejection_feedback.as_deref(),
        Some("[REVIEW FEEDBACK]\n\"please add tests\"\nPlease address this.")
    );

    let history = engine.ticket_workflow.get_history(ticket.id).await.expect("history");
    let last = history.last().expect("last history row");
    assert_eq!(last.feedback.as_deref(), Some("please add tests"));
}

#[tokio::test(flavor = "multi_thread")]
async fn jumping_straight_from_backlog_to_review_is_rejected_and_leaves_no_history() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = Arc::new(InMemoryRepository::new());
    let multiplexer = Arc::new(ScriptedMultiplexer::new());
    let (_project, ticket) = seed_project_and_ticket(&repo, dir.path().to_str().expect("utf8 path")).await;

    let engine = build_engine(repo.clone(), multiplexer.clone(), dir.path());
    engine.start().await.expect("engine starts");

    let err = engine
        .ticket_workflow
        .transition(ticket.id, TicketState::Review, TransitionTrigger::Auto, TransitionReason::CompletionDetected, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, sessions_core::error::ErrorKind::Invariant);

    let history = engine.ticket_workflow.get_history(ticket.id).await.expect("history");
    assert!(history.is_empty());

    let unchanged = repo.get_ticket(ticket.id).await.expect("ticket exists");
    assert_eq!(unchanged.state, TicketState::Backlog);
}
