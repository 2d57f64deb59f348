// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process repository double. Grounded on the broker's `PodRegistry`
//! (`RwLock<HashMap<..>>` with synchronous critical sections) — the
//! relational store itself is out of scope (§1), so production code talks
//! to this contract through an adapter built elsewhere; this double is
//! what every other crate in this workspace tests against.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use sessions_core::error::{Error, Result};
use sessions_core::ids::{
    HandoffEventId, NotificationId, ProjectId, SessionId, TicketId, TicketStateHistoryEntryId,
};
use sessions_core::model::{
    HandoffEvent, Notification, Project, Session, SessionStatus, Ticket, TicketState,
    TicketStateHistoryEntry,
};
use sessions_core::time::EpochMillis;

use crate::contract::{
    HandoffEventsRepository, NotificationsRepository, ProjectPatch, ProjectsRepository,
    SessionPatch, SessionsRepository, TicketPatch, TicketStateHistoryRepository, TicketsRepository,
};

#[derive(Default)]
struct State {
    projects: HashMap<ProjectId, Project>,
    tickets: HashMap<TicketId, Ticket>,
    sessions: HashMap<SessionId, Session>,
    ticket_history: HashMap<TicketStateHistoryEntryId, TicketStateHistoryEntry>,
    handoff_events: HashMap<HandoffEventId, HandoffEvent>,
    notifications: HashMap<NotificationId, Notification>,
}

/// Single-process, non-persistent implementation of every repository trait.
pub struct InMemoryRepository {
    state: RwLock<State>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self { state: RwLock::new(State::default()) }
    }
}

#[async_trait]
impl ProjectsRepository for InMemoryRepository {
    async fn get_project(&self, id: ProjectId) -> Result<Project> {
        self.state
            .read()
            .await
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("project {id} not found")))
    }

    async fn list_projects(&self, page: u32, limit: u32) -> Result<Vec<Project>> {
        let state = self.state.read().await;
        let mut projects: Vec<Project> = state.projects.values().cloned().collect();
        projects.sort_by_key(|p| p.created_at);
        let start = (page as usize) * (limit as usize);
        Ok(projects.into_iter().skip(start).take(limit as usize).collect())
    }

    async fn create_project(&self, project: Project) -> Result<Project> {
        let mut state = self.state.write().await;
        if state.projects.contains_key(&project.id) {
            return Err(Error::conflict(format!("project {} already exists", project.id)));
        }
        state.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn update_project(&self, id: ProjectId, patch: ProjectPatch) -> Result<Project> {
        let mut state = self.state.write().await;
        let project = state
            .projects
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("project {id} not found")))?;
        if let Some(name) = patch.display_name {
            project.display_name = name;
        }
        if let Some(window) = patch.multiplexer_window_name {
            project.multiplexer_window_name = window;
        }
        Ok(project.clone())
    }

    async fn delete_project(&self, id: ProjectId) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .projects
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("project {id} not found")))
    }
}

#[async_trait]
impl TicketsRepository for InMemoryRepository {
    async fn get_ticket(&self, id: TicketId) -> Result<Ticket> {
        self.state
            .read()
            .await
            .tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("ticket {id} not found")))
    }

    async fn list_tickets(&self, project_id: ProjectId, state_filter: Option<TicketState>) -> Result<Vec<Ticket>> {
        let state = self.state.read().await;
        Ok(state
            .tickets
            .values()
            .filter(|t| t.project_id == project_id)
            .filter(|t| state_filter.is_none_or(|s| t.state == s))
            .cloned()
            .collect())
    }

    async fn count_tickets(&self, project_id: ProjectId, state_filter: Option<TicketState>) -> Result<u64> {
        Ok(self.list_tickets(project_id, state_filter).await?.len() as u64)
    }

    async fn create_ticket(&self, ticket: Ticket) -> Result<Ticket> {
        let mut state = self.state.write().await;
        let dup = state
            .tickets
            .values()
            .any(|t| t.project_id == ticket.project_id && t.file_path == ticket.file_path);
        if dup {
            return Err(Error::conflict(format!(
                "ticket already exists for project {} at path {}",
                ticket.project_id, ticket.file_path
            )));
        }
        state.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn update_ticket(&self, id: TicketId, patch: TicketPatch) -> Result<Ticket> {
        let mut state = self.state.write().await;
        let ticket = state
            .tickets
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("ticket {id} not found")))?;
        if let Some(title) = patch.title {
            ticket.title = title;
        }
        if let Some(started_at) = patch.started_at {
            ticket.started_at = started_at;
        }
        if let Some(completed_at) = patch.completed_at {
            ticket.completed_at = completed_at;
        }
        if let Some(feedback) = patch.rejection_feedback {
            ticket.rejection_feedback = feedback;
        }
        Ok(ticket.clone())
    }

    async fn transition_ticket_atomic(
        &self,
        ticket_id: TicketId,
        from: TicketState,
        to: TicketState,
        history_entry: TicketStateHistoryEntry,
        patch: TicketPatch,
    ) -> Result<Ticket> {
        let mut state = self.state.write().await;
        let ticket = state
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| Error::not_found(format!("ticket {ticket_id} not found")))?;
        if ticket.state != from {
            return Err(Error::conflict(format!(
                "ticket {ticket_id} is in state {:?}, expected {:?}",
                ticket.state, from
            )));
        }
        ticket.state = to;
        ticket.updated_at = history_entry.created_at;
        if let Some(title) = patch.title {
            ticket.title = title;
        }
        if let Some(started_at) = patch.started_at {
            ticket.started_at = started_at;
        }
        if let Some(completed_at) = patch.completed_at {
            ticket.completed_at = completed_at;
        }
        if let Some(feedback) = patch.rejection_feedback {
            ticket.rejection_feedback = feedback;
        }
        let updated = ticket.clone();
        state.ticket_history.insert(history_entry.id, history_entry);
        Ok(updated)
    }
}

#[async_trait]
impl SessionsRepository for InMemoryRepository {
    async fn get_session(&self, id: SessionId) -> Result<Session> {
        self.state
            .read()
            .await
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("session {id} not found")))
    }

    async fn list_sessions(&self, project_id: Option<ProjectId>) -> Result<Vec<Session>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| project_id.is_none_or(|p| s.project_id == p))
            .cloned()
            .collect())
    }

    async fn create_session(&self, session: Session) -> Result<Session> {
        let mut state = self.state.write().await;
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn update_session(&self, id: SessionId, patch: SessionPatch) -> Result<Session> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("session {id} not found")))?;
        if let Some(status) = patch.status {
            session.status = status;
        }
        if let Some(context_percent) = patch.context_percent {
            session.context_percent = context_percent;
        }
        if let Some(pane_id) = patch.pane_id {
            session.pane_id = pane_id;
        }
        if let Some(started_at) = patch.started_at {
            session.started_at = started_at;
        }
        if let Some(ended_at) = patch.ended_at {
            session.ended_at = ended_at;
        }
        Ok(session.clone())
    }

    async fn find_one_active_session(&self, project_id: ProjectId, ticket_id: TicketId) -> Result<Option<Session>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .find(|s| {
                s.project_id == project_id && s.ticket_id == Some(ticket_id) && s.status.is_active()
            })
            .cloned())
    }

    async fn mark_session_exited(&self, id: SessionId, status: SessionStatus, ended_at: EpochMillis) -> Result<Session> {
        self.update_session(
            id,
            SessionPatch { status: Some(status), ended_at: Some(Some(ended_at)), ..Default::default() },
        )
        .await
    }
}

#[async_trait]
impl TicketStateHistoryRepository for InMemoryRepository {
    async fn insert_ticket_history(&self, entry: TicketStateHistoryEntry) -> Result<TicketStateHistoryEntry> {
        let mut state = self.state.write().await;
        state.ticket_history.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn list_ticket_history(&self, ticket_id: TicketId) -> Result<Vec<TicketStateHistoryEntry>> {
        let state = self.state.read().await;
        let mut rows: Vec<TicketStateHistoryEntry> =
            state.ticket_history.values().filter(|e| e.ticket_id == ticket_id).cloned().collect();
        rows.sort_by_key(|e| e.created_at);
        Ok(rows)
    }
}

#[async_trait]
impl HandoffEventsRepository for InMemoryRepository {
    async fn insert_handoff_event(&self, event: HandoffEvent) -> Result<HandoffEvent> {
        let mut state = self.state.write().await;
        state.handoff_events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn list_handoff_events(&self, from_session_id: Option<SessionId>) -> Result<Vec<HandoffEvent>> {
        let state = self.state.read().await;
        Ok(state
            .handoff_events
            .values()
            .filter(|e| from_session_id.is_none_or(|id| e.from_session_id == id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationsRepository for InMemoryRepository {
    async fn insert_notification(&self, notification: Notification) -> Result<Notification> {
        let mut state = self.state.write().await;
        state.notifications.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn list_notifications(&self, dismissed: Option<bool>) -> Result<Vec<Notification>> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .values()
            .filter(|n| dismissed.is_none_or(|d| n.dismissed == d))
            .cloned()
            .collect())
    }

    async fn dismiss_notification(&self, id: NotificationId) -> Result<Notification> {
        let mut state = self.state.write().await;
        let notification = state
            .notifications
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("notification {id} not found")))?;
        notification.dismissed = true;
        Ok(notification.clone())
    }

    async fn dismiss_all_notifications(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut count = 0u64;
        for notification in state.notifications.values_mut() {
            if !notification.dismissed {
                notification.dismissed = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_undismissed_notifications(&self) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.notifications.values().filter(|n| !n.dismissed).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_project() -> Project {
        Project {
            id: ProjectId::new(),
            display_name: "demo".into(),
            repo_path: "/repos/demo".into(),
            multiplexer_session_name: "demo".into(),
            multiplexer_window_name: None,
            ticket_corpus_path: "tickets".into(),
            handoff_path: ".handoff.json".into(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = InMemoryRepository::new();
        let project = sample_project();
        repo.create_project(project.clone()).await.expect("create");
        let fetched = repo.get_project(project.id).await.expect("get");
        assert_eq!(fetched, project);
    }

    #[tokio::test]
    async fn get_missing_project_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo.get_project(ProjectId::new()).await.unwrap_err();
        assert_eq!(err.kind, sessions_core::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn state_transition_atomic_rejects_mismatched_from_state() {
        let repo = InMemoryRepository::new();
        let project = sample_project();
        repo.create_project(project.clone()).await.expect("create project");
        let ticket = Ticket {
            id: TicketId::new(),
            project_id: project.id,
            external_id: None,
            title: "t".into(),
            state: TicketState::Backlog,
            file_path: "a.md".into(),
            is_adhoc: false,
            is_explore: false,
            started_at: None,
            completed_at: None,
            rejection_feedback: None,
            created_at: 0,
            updated_at: 0,
        };
        repo.create_ticket(ticket.clone()).await.expect("create ticket");

        let history = TicketStateHistoryEntry {
            id: TicketStateHistoryEntryId::new(),
            ticket_id: ticket.id,
            from_state: TicketState::Review,
            to_state: TicketState::Done,
            trigger: sessions_core::model::TransitionTrigger::Manual,
            reason: sessions_core::model::TransitionReason::UserApproved,
            feedback: None,
            triggered_by: None,
            created_at: 1,
        };
        let err = repo
            .transition_ticket_atomic(ticket.id, TicketState::Review, TicketState::Done, history, TicketPatch::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, sessions_core::error::ErrorKind::Conflict);

        let unchanged = repo.get_ticket(ticket.id).await.expect("find");
        assert_eq!(unchanged.state, TicketState::Backlog);
        assert!(repo.list_ticket_history(ticket.id).await.expect("list history").is_empty());
    }

    #[tokio::test]
    async fn find_one_active_respects_active_status_set() {
        let repo = InMemoryRepository::new();
        let project = sample_project();
        repo.create_project(project.clone()).await.expect("create project");
        let ticket_id = TicketId::new();
        let session = Session {
            id: SessionId::new(),
            project_id: project.id,
            ticket_id: Some(ticket_id),
            parent_session_id: None,
            session_type: sessions_core::model::SessionType::Ticket,
            status: SessionStatus::Completed,
            context_percent: None,
            pane_id: None,
            started_at: None,
            ended_at: Some(5),
            created_at: 0,
            updated_at: 5,
        };
        repo.create_session(session).await.expect("create session");
        assert!(repo.find_one_active_session(project.id, ticket_id).await.expect("query").is_none());
    }
}
