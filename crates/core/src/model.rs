// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain entities (§3). These are plain data; no entity here owns a
//! lifecycle or an I/O handle — that belongs to the Supervisor, Context
//! Monitor, and friends.

use serde::{Deserialize, Serialize};

use crate::ids::{
    HandoffEventId, NotificationId, ProjectId, SessionId, TicketId, TicketStateHistoryEntryId,
};
use crate::time::EpochMillis;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub display_name: String,
    pub repo_path: String,
    pub multiplexer_session_name: String,
    pub multiplexer_window_name: Option<String>,
    pub ticket_corpus_path: String,
    pub handoff_path: String,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

/// §4.7 allowed transition table. `InvalidTransition` (§7) covers every
/// pair not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    Backlog,
    InProgress,
    Review,
    Done,
}

impl TicketState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    Auto,
    Manual,
    Reviewer,
}

/// Reasons named across §4.7 and §8 scenarios. Kept as an enumerated set
/// rather than a free-form string so history rows stay queryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    SessionStarted,
    CompletionDetected,
    Completion,
    UserApproved,
    ReviewerApproved,
    UserRejected,
    ReviewerRejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub project_id: ProjectId,
    /// Null for ad-hoc tickets (§3, §9 Open Question: canonical shape per
    /// this spec keeps `external_id` nullable and `is_explore` present;
    /// see DESIGN.md).
    pub external_id: Option<String>,
    pub title: String,
    pub state: TicketState,
    pub file_path: String,
    pub is_adhoc: bool,
    pub is_explore: bool,
    pub started_at: Option<EpochMillis>,
    pub completed_at: Option<EpochMillis>,
    pub rejection_feedback: Option<String>,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStateHistoryEntry {
    pub id: TicketStateHistoryEntryId,
    pub ticket_id: TicketId,
    pub from_state: TicketState,
    pub to_state: TicketState,
    pub trigger: TransitionTrigger,
    pub reason: TransitionReason,
    pub feedback: Option<String>,
    pub triggered_by: Option<String>,
    pub created_at: EpochMillis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Ticket,
    Adhoc,
}

/// Adopts the superset named in §3/§9: {starting, running, paused,
/// completed, error}. Persisted-value mapping is fixed in DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Running,
    Paused,
    Completed,
    Error,
}

impl SessionStatus {
    /// Statuses counted by the one-running-session-per-ticket invariant.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Paused)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub project_id: ProjectId,
    pub ticket_id: Option<TicketId>,
    pub parent_session_id: Option<SessionId>,
    pub session_type: SessionType,
    pub status: SessionStatus,
    /// [0, 100] or unsampled.
    pub context_percent: Option<u8>,
    /// Opaque multiplexer handle, e.g. "%5" (§6).
    pub pane_id: Option<String>,
    pub started_at: Option<EpochMillis>,
    pub ended_at: Option<EpochMillis>,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffEvent {
    pub id: HandoffEventId,
    pub from_session_id: SessionId,
    pub to_session_id: SessionId,
    pub context_at_handoff: u8,
    pub created_at: EpochMillis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    WaitingInput,
    ReviewReady,
    HandoffComplete,
    Error,
    ContextLow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub notification_type: NotificationType,
    pub message: String,
    pub session_id: Option<SessionId>,
    pub ticket_id: Option<TicketId>,
    pub dismissed: bool,
    pub created_at: EpochMillis,
}
