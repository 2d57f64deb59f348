// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events emitted by the Session Supervisor (§4.4). Broadcast so the
//! Fan-out Bus and Waiting Detector can subscribe without the Supervisor
//! holding references to either (§9).

use sessions_core::ids::SessionId;
use sessions_core::model::SessionStatus;

#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    Output { session_id: SessionId, lines: Vec<String> },
    Status { session_id: SessionId, previous: SessionStatus, new: SessionStatus, context_percent: Option<u8> },
    Exit { session_id: SessionId, exit_code: Option<i32> },
    Error { session_id: SessionId, message: String },
}
