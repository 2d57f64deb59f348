// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket State Machine (§4.7): guarded transitions, append-only
//! history, one-running-session reconciliation on approve.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use sessions_core::error::{Error, Result};
use sessions_core::ids::TicketId;
use sessions_core::model::{Ticket, TicketStateHistoryEntry, TransitionReason, TransitionTrigger};
use sessions_core::time::Clock;
use sessions_repository::{Repository, TicketPatch};
use sessions_supervisor::Supervisor;

use crate::events::TicketEvent;
use crate::transitions::{format_rejection_feedback, guard, is_approve, is_reject, FeedbackRequirement};

const EVENT_QUEUE_DEPTH: usize = 256;

pub struct TicketWorkflow {
    repo: Arc<dyn Repository>,
    supervisor: Arc<Supervisor>,
    clock: Arc<dyn Clock>,
    events_tx: broadcast::Sender<TicketEvent>,
}

impl TicketWorkflow {
    pub fn new(repo: Arc<dyn Repository>, supervisor: Arc<Supervisor>, clock: Arc<dyn Clock>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_QUEUE_DEPTH);
        Self { repo, supervisor, clock, events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TicketEvent> {
        self.events_tx.subscribe()
    }

    pub async fn get_history(&self, ticket_id: TicketId) -> Result<Vec<TicketStateHistoryEntry>> {
        self.repo.list_ticket_history(ticket_id).await
    }

    /// Applies one guarded transition (§4.7 table). `feedback` is required
    /// when `reason` is a rejection reason.
    pub async fn transition(
        &self,
        ticket_id: TicketId,
        to: sessions_core::model::TicketState,
        trigger: TransitionTrigger,
        reason: TransitionReason,
        triggered_by: Option<sessions_core::ids::SessionId>,
        feedback: Option<String>,
    ) -> Result<Ticket> {
        let ticket = self.repo.get_ticket(ticket_id).await?;
        let from = ticket.state;

        let requirement = guard(from, to, trigger, reason).ok_or_else(|| {
            Error::invariant(format!("invalid ticket transition {from:?} -> {to:?} (trigger={trigger:?}, reason={reason:?})"))
        })?;

        if requirement == FeedbackRequirement::Required && feedback.as_deref().unwrap_or("").trim().is_empty() {
            return Err(Error::validation("feedback text is required for a rejection transition"));
        }

        let now = self.clock.now_ms();
        let history_entry = TicketStateHistoryEntry {
            id: sessions_core::ids::TicketStateHistoryEntryId::new(),
            ticket_id,
            from_state: from,
            to_state: to,
            trigger,
            reason,
            feedback: feedback.clone(),
            triggered_by: triggered_by.map(|id| id.to_string()),
            created_at: now,
        };

        let mut patch = TicketPatch::default();
        if is_reject(to, reason) {
            let raw = feedback.clone().unwrap_or_default();
            patch.rejection_feedback = Some(Some(format_rejection_feedback(&raw)));
        } else if is_approve(reason) {
            patch.completed_at = Some(Some(now));
        }

        let updated = self.repo.transition_ticket_atomic(ticket_id, from, to, history_entry, patch).await?;

        if is_approve(reason) {
            if let Ok(Some(session)) = self.repo.find_one_active_session(updated.project_id, ticket_id).await {
                if let Err(err) = self.supervisor.stop_session(session.id, false).await {
                    warn!(%ticket_id, session_id = %session.id, error = %err, "best-effort stop of running session on approve failed");
                }
            }
        }

        let _ = self.events_tx.send(TicketEvent::StateChange {
            ticket_id,
            from_state: from,
            to_state: to,
            trigger,
            reason,
            feedback,
            session_id: triggered_by,
        });

        Ok(updated)
    }
}
