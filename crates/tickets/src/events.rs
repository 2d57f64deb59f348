// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use sessions_core::ids::{SessionId, TicketId};
use sessions_core::model::{TicketState, TransitionReason, TransitionTrigger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketEvent {
    StateChange {
        ticket_id: TicketId,
        from_state: TicketState,
        to_state: TicketState,
        trigger: TransitionTrigger,
        reason: TransitionReason,
        feedback: Option<String>,
        /// The session the transition was triggered from, when there was
        /// one (§4.9 `review:result.sessionId`).
        session_id: Option<SessionId>,
    },
}
