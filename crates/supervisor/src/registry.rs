// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volatile registry of active sessions (§3 Ownership, §5 Shared-resource
//! policy): single-writer (Supervisor), multi-reader, guarded by a
//! `RwLock<HashMap<..>>` the way the broker's `PodRegistry` tracks pods.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use sessions_core::ids::SessionId;
use sessions_core::pane::PaneId;
use sessions_core::ring::OutputRingBuffer;
use sessions_core::time::EpochMillis;

/// Everything the poll loop and input path need for one active session.
pub struct ActiveSession {
    pub pane_id: PaneId,
    pub ring: Arc<OutputRingBuffer>,
    pub last_capture: String,
    pub last_input_at: Option<EpochMillis>,
    pub poll_cancel: CancellationToken,
    /// Sent once the pane is confirmed alive on the poll loop's first tick
    /// (§4.4 start_session: "writes persistent record with status=starting
    /// ... an internal task transitions to running once the pane shows the
    /// assistant prompt").
    pub pending_prompt: Option<String>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<RwLock<ActiveSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: SessionId, active: ActiveSession) {
        self.sessions.write().await.insert(id, Arc::new(RwLock::new(active)));
    }

    pub async fn get(&self, id: SessionId) -> Option<Arc<RwLock<ActiveSession>>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: SessionId) -> Option<Arc<RwLock<ActiveSession>>> {
        self.sessions.write().await.remove(&id)
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    pub async fn active_ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().copied().collect()
    }
}
