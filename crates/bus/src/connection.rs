// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection bookkeeping that lives only inside `crate::handler`'s
//! task, not in the shared hub: rate limiting and PTY attachment state are
//! connection-local, unlike session subscriptions which the hub arbitrates.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use sessions_core::ids::SessionId;
use sessions_pty::ConnectionId as PtyConnectionId;

use crate::rate_limit::RateLimiter;

pub struct ConnectionContext {
    pub limiter: RateLimiter,
    pub last_pong: Instant,
    /// Dimensions remembered from the most recent `pty:attach`, reused by
    /// `pty:select_pane` when it re-attaches without being given new ones.
    pty_dims: HashMap<SessionId, (u16, u16)>,
    attached: HashSet<SessionId>,
}

impl ConnectionContext {
    pub fn new(rate_limit_count: u32, rate_limit_window: Duration) -> Self {
        Self {
            limiter: RateLimiter::new(rate_limit_count, rate_limit_window),
            last_pong: Instant::now(),
            pty_dims: HashMap::new(),
            attached: HashSet::new(),
        }
    }

    pub fn note_attach(&mut self, session_id: SessionId, cols: u16, rows: u16) {
        self.pty_dims.insert(session_id, (cols, rows));
        self.attached.insert(session_id);
    }

    pub fn note_detach(&mut self, session_id: SessionId) {
        self.attached.remove(&session_id);
    }

    pub fn is_attached(&self, session_id: SessionId) -> bool {
        self.attached.contains(&session_id)
    }

    pub fn last_dims(&self, session_id: SessionId) -> Option<(u16, u16)> {
        self.pty_dims.get(&session_id).copied()
    }

    pub fn attached_sessions(&self) -> Vec<SessionId> {
        self.attached.iter().copied().collect()
    }
}

/// Encodes the bus connection id and session id into the opaque id
/// `sessions-pty` uses to key its attachment table, so a PTY event can be
/// routed back to the one connection that requested it.
pub fn encode_pty_connection(conn_id: u64, session_id: SessionId) -> PtyConnectionId {
    PtyConnectionId(format!("{conn_id}:{session_id}"))
}
