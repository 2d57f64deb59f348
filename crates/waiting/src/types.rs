// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared types for the waiting-state fusion (§4.6).

use sessions_core::ids::SessionId;
use sessions_core::time::EpochMillis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitingReason {
    OutputPrompt,
    PermissionPrompt,
    IdlePrompt,
    Stopped,
}

impl WaitingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutputPrompt => "output_prompt",
            Self::PermissionPrompt => "permission_prompt",
            Self::IdlePrompt => "idle_prompt",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    OutputMatcher,
    Telemetry,
    Hook,
    ClearTimeout,
}

#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub waiting: bool,
    pub reason: WaitingReason,
    pub source: Source,
    pub timestamp: EpochMillis,
}

#[derive(Debug, Clone, Copy)]
pub struct WaitingState {
    pub waiting: bool,
    pub reason: Option<WaitingReason>,
    pub detected_by: Option<Source>,
    pub timestamp: EpochMillis,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitingEvent {
    StateChange {
        session_id: SessionId,
        waiting: bool,
        reason: Option<WaitingReason>,
        detected_by: Option<Source>,
        timestamp: EpochMillis,
    },
}

/// Payload an out-of-band lifecycle hook can push in directly (§4.6,
/// handle_hook_event).
#[derive(Debug, Clone, Copy)]
pub struct HookPayload {
    pub session_id: SessionId,
    pub reason: WaitingReason,
}

#[derive(Debug, Clone, Copy)]
pub struct WaitingConfig {
    pub debounce: std::time::Duration,
    pub clear_delay: std::time::Duration,
}

impl Default for WaitingConfig {
    fn default() -> Self {
        Self { debounce: std::time::Duration::from_millis(500), clear_delay: std::time::Duration::from_secs(2) }
    }
}
