// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use sessions_core::ids::{SessionId, TicketId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffPhase {
    Exporting,
    WaitingFile,
    Spawning,
    Importing,
}

/// Events emitted at the handoff:* points named in §4.8. Named distinctly
/// from `sessions_core::model::HandoffEvent` (the persisted row) since the
/// two are easy to confuse when imported side by side.
#[derive(Debug, Clone)]
pub enum HandoffNotice {
    Started { session_id: SessionId, ticket_id: TicketId, context_at_handoff: u8 },
    Progress { session_id: SessionId, phase: HandoffPhase, elapsed_ms: u64 },
    Completed { from_session_id: SessionId, to_session_id: SessionId, ticket_id: TicketId },
    Failed { session_id: SessionId, reason: String },
}
