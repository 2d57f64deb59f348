// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence surface (§6). The relational store itself is out of scope;
//! this is the contract every component above it programs against.
//!
//! Traits mirror the teacher's `Backend` object-safety discipline but use
//! `async_trait` rather than hand-written `Pin<Box<dyn Future>>` futures,
//! since these contracts are consumed through `Arc<dyn Trait>` and never
//! need to be `'static`-erased inline the way a PTY backend does.
//!
//! Method names are entity-qualified (`get_project`, not `get`) even
//! though each trait is implemented alone: `Repository` bundles all six
//! into one `dyn` object, and an unqualified `list`/`create`/`update`
//! would be ambiguous across the sub-traits' same-named methods no
//! matter how their argument types differ.

use async_trait::async_trait;

use sessions_core::error::Result;
use sessions_core::ids::{
    HandoffEventId, NotificationId, ProjectId, SessionId, TicketId, TicketStateHistoryEntryId,
};
use sessions_core::model::{
    HandoffEvent, Notification, Project, Session, SessionStatus, Ticket, TicketState,
    TicketStateHistoryEntry,
};
use sessions_core::time::EpochMillis;

/// A sparse patch: `None` means "leave unchanged", matching the `update
/// (partial)` operations named in §6.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub display_name: Option<String>,
    pub multiplexer_window_name: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct TicketPatch {
    pub title: Option<String>,
    pub started_at: Option<Option<EpochMillis>>,
    pub completed_at: Option<Option<EpochMillis>>,
    pub rejection_feedback: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub context_percent: Option<Option<u8>>,
    pub pane_id: Option<Option<String>>,
    pub started_at: Option<Option<EpochMillis>>,
    pub ended_at: Option<Option<EpochMillis>>,
}

#[async_trait]
pub trait ProjectsRepository: Send + Sync {
    async fn get_project(&self, id: ProjectId) -> Result<Project>;
    async fn list_projects(&self, page: u32, limit: u32) -> Result<Vec<Project>>;
    async fn create_project(&self, project: Project) -> Result<Project>;
    async fn update_project(&self, id: ProjectId, patch: ProjectPatch) -> Result<Project>;
    async fn delete_project(&self, id: ProjectId) -> Result<()>;
}

#[async_trait]
pub trait TicketsRepository: Send + Sync {
    async fn get_ticket(&self, id: TicketId) -> Result<Ticket>;
    async fn list_tickets(&self, project_id: ProjectId, state: Option<TicketState>) -> Result<Vec<Ticket>>;
    async fn count_tickets(&self, project_id: ProjectId, state: Option<TicketState>) -> Result<u64>;
    async fn create_ticket(&self, ticket: Ticket) -> Result<Ticket>;
    async fn update_ticket(&self, id: TicketId, patch: TicketPatch) -> Result<Ticket>;

    /// Atomically moves `ticket_id` from `from` to `to`, applies `patch`
    /// (e.g. the formatted rejection_feedback), and inserts `history_entry`
    /// in the same transaction (§4.7, §5). Fails with `Conflict` if the
    /// ticket's current state is not `from`.
    async fn transition_ticket_atomic(
        &self,
        ticket_id: TicketId,
        from: TicketState,
        to: TicketState,
        history_entry: TicketStateHistoryEntry,
        patch: TicketPatch,
    ) -> Result<Ticket>;
}

#[async_trait]
pub trait SessionsRepository: Send + Sync {
    async fn get_session(&self, id: SessionId) -> Result<Session>;
    async fn list_sessions(&self, project_id: Option<ProjectId>) -> Result<Vec<Session>>;
    async fn create_session(&self, session: Session) -> Result<Session>;
    async fn update_session(&self, id: SessionId, patch: SessionPatch) -> Result<Session>;

    /// The session currently occupying the one-active-slot for this
    /// (project, ticket) pair, if any (§3 invariant).
    async fn find_one_active_session(&self, project_id: ProjectId, ticket_id: TicketId) -> Result<Option<Session>>;

    async fn mark_session_exited(
        &self,
        id: SessionId,
        status: SessionStatus,
        ended_at: EpochMillis,
    ) -> Result<Session>;
}

#[async_trait]
pub trait TicketStateHistoryRepository: Send + Sync {
    async fn insert_ticket_history(&self, entry: TicketStateHistoryEntry) -> Result<TicketStateHistoryEntry>;
    /// Ordered by `created_at` ascending (§6).
    async fn list_ticket_history(&self, ticket_id: TicketId) -> Result<Vec<TicketStateHistoryEntry>>;
}

#[async_trait]
pub trait HandoffEventsRepository: Send + Sync {
    async fn insert_handoff_event(&self, event: HandoffEvent) -> Result<HandoffEvent>;
    async fn list_handoff_events(&self, from_session_id: Option<SessionId>) -> Result<Vec<HandoffEvent>>;
}

#[async_trait]
pub trait NotificationsRepository: Send + Sync {
    async fn insert_notification(&self, notification: Notification) -> Result<Notification>;
    async fn list_notifications(&self, dismissed: Option<bool>) -> Result<Vec<Notification>>;
    async fn dismiss_notification(&self, id: NotificationId) -> Result<Notification>;
    async fn dismiss_all_notifications(&self) -> Result<u64>;
    async fn count_undismissed_notifications(&self) -> Result<u64>;
}

/// Bundles the six surfaces so callers (Supervisor, Orchestrator, ...) can
/// hold one handle instead of six.
pub trait Repository:
    ProjectsRepository
    + TicketsRepository
    + SessionsRepository
    + TicketStateHistoryRepository
    + HandoffEventsRepository
    + NotificationsRepository
{
}

impl<T> Repository for T where
    T: ProjectsRepository
        + TicketsRepository
        + SessionsRepository
        + TicketStateHistoryRepository
        + HandoffEventsRepository
        + NotificationsRepository
{
}
