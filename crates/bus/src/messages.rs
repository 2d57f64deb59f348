// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire schema for the Fan-out Bus (§4.9). Internally-tagged on `type`,
//! mirroring the teacher's `ServerMessage`/`ClientMessage` convention, with
//! an explicit `payload` field per message since these events nest ids and
//! data rather than sitting flat on the envelope.

use serde::{Deserialize, Serialize};

use sessions_core::ids::{SessionId, TicketId};
use sessions_core::model::{SessionStatus, TicketState, TransitionReason, TransitionTrigger};
use sessions_core::time::EpochMillis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidMessage,
    SessionNotFound,
    NotSubscribed,
    PtyAttachFailed,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseError => "PARSE_ERROR",
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::NotSubscribed => "NOT_SUBSCRIBED",
            Self::PtyAttachFailed => "PTY_ATTACH_FAILED",
            Self::RateLimited => "RATE_LIMITED",
            Self::Internal => "INTERNAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdPayload {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInputPayload {
    pub session_id: SessionId,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtyAttachPayload {
    pub session_id: SessionId,
    pub cols: u16,
    pub rows: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtyWritePayload {
    pub session_id: SessionId,
    /// Base64-encoded bytes, matching the `pty:output` wire encoding.
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtyResizePayload {
    pub session_id: SessionId,
    pub cols: u16,
    pub rows: u16,
}

/// Inbound client -> server messages (§4.9).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    #[serde(rename = "session:subscribe")]
    SessionSubscribe { payload: SessionIdPayload },
    #[serde(rename = "session:unsubscribe")]
    SessionUnsubscribe { payload: SessionIdPayload },
    #[serde(rename = "session:input")]
    SessionInput { payload: SessionInputPayload },
    #[serde(rename = "pty:attach")]
    PtyAttach { payload: PtyAttachPayload },
    #[serde(rename = "pty:detach")]
    PtyDetach { payload: SessionIdPayload },
    #[serde(rename = "pty:write")]
    PtyWrite { payload: PtyWritePayload },
    #[serde(rename = "pty:resize")]
    PtyResize { payload: PtyResizePayload },
    #[serde(rename = "pty:select_pane")]
    PtySelectPane { payload: SessionIdPayload },
}

/// Outbound server -> client messages (§4.9).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong {
        payload: PongPayload,
    },
    Subscribed {
        payload: SubscribedPayload,
    },
    Unsubscribed {
        payload: SessionIdPayload,
    },
    #[serde(rename = "session:output")]
    SessionOutput {
        payload: SessionOutputPayload,
    },
    #[serde(rename = "session:status")]
    SessionStatus {
        payload: SessionStatusPayload,
    },
    #[serde(rename = "session:waiting")]
    SessionWaiting {
        payload: SessionWaitingPayload,
    },
    #[serde(rename = "session:exit")]
    SessionExit {
        payload: SessionExitPayload,
    },
    #[serde(rename = "context:threshold")]
    ContextThreshold {
        payload: ContextThresholdPayload,
    },
    #[serde(rename = "pty:output")]
    PtyOutput {
        payload: PtyOutputPayload,
    },
    #[serde(rename = "pty:attached")]
    PtyAttached {
        payload: SessionIdPayload,
    },
    #[serde(rename = "pty:exit")]
    PtyExit {
        payload: PtyExitPayload,
    },
    #[serde(rename = "ticket:state")]
    TicketState {
        payload: TicketStatePayload,
    },
    #[serde(rename = "review:result")]
    ReviewResult {
        payload: ReviewResultPayload,
    },
    Notification {
        payload: NotificationPayload,
    },
    Error {
        payload: ErrorPayload,
    },
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error { payload: ErrorPayload { code: code.as_str().to_string(), message: message.into() } }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PongPayload {
    pub timestamp: EpochMillis,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedPayload {
    pub session_id: SessionId,
    pub buffer_lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutputPayload {
    pub session_id: SessionId,
    pub lines: Vec<String>,
    pub raw: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusPayload {
    pub session_id: SessionId,
    pub previous_status: SessionStatus,
    pub new_status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_percent: Option<u8>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionWaitingPayload {
    pub session_id: SessionId,
    pub waiting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExitPayload {
    pub session_id: SessionId,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextThresholdPayload {
    pub session_id: SessionId,
    pub context_percent: u8,
    pub threshold: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PtyOutputPayload {
    pub session_id: SessionId,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PtyExitPayload {
    pub session_id: SessionId,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStatePayload {
    pub ticket_id: TicketId,
    pub previous_state: TicketState,
    pub new_state: TicketState,
    pub trigger: TransitionTrigger,
    pub reason: TransitionReason,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResultPayload {
    pub ticket_id: TicketId,
    pub session_id: Option<SessionId>,
    pub trigger: TransitionTrigger,
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}
