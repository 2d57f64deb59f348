// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fuses output-pattern, telemetry, and hook signals into one debounced
//! per-session waiting state (§4.6).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use sessions_core::error::{Error, Result};
use sessions_core::ids::SessionId;
use sessions_core::time::Clock;

use crate::types::{Candidate, HookPayload, Source, WaitingConfig, WaitingEvent, WaitingReason, WaitingState};

pub const EVENT_QUEUE_DEPTH: usize = 256;

struct SessionWatch {
    latest: Candidate,
    last_emitted: Option<(bool, WaitingReason)>,
    debounce_cancel: CancellationToken,
    clear_cancel: CancellationToken,
}

impl SessionWatch {
    fn fresh(now: sessions_core::time::EpochMillis) -> Self {
        Self {
            latest: Candidate { waiting: false, reason: WaitingReason::Stopped, source: Source::ClearTimeout, timestamp: now },
            last_emitted: None,
            debounce_cancel: CancellationToken::new(),
            clear_cancel: CancellationToken::new(),
        }
    }
}

pub struct WaitingDetector {
    clock: Arc<dyn Clock>,
    config: RwLock<WaitingConfig>,
    sessions: RwLock<HashMap<SessionId, SessionWatch>>,
    events_tx: broadcast::Sender<WaitingEvent>,
}

impl WaitingDetector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_QUEUE_DEPTH);
        Self { clock, config: RwLock::new(WaitingConfig::default()), sessions: RwLock::new(HashMap::new()), events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WaitingEvent> {
        self.events_tx.subscribe()
    }

    pub async fn get_config(&self) -> WaitingConfig {
        *self.config.read().await
    }

    pub async fn update_config(&self, config: WaitingConfig) {
        *self.config.write().await = config;
    }

    pub async fn watch_session(&self, session_id: SessionId) {
        let now = self.clock.now_ms();
        self.sessions.write().await.entry(session_id).or_insert_with(|| SessionWatch::fresh(now));
    }

    pub async fn unwatch_session(&self, session_id: SessionId) {
        if let Some(watch) = self.sessions.write().await.remove(&session_id) {
            watch.debounce_cancel.cancel();
            watch.clear_cancel.cancel();
        }
    }

    pub async fn get_waiting_state(&self, session_id: SessionId) -> Result<WaitingState> {
        let sessions = self.sessions.read().await;
        let watch = sessions.get(&session_id).ok_or_else(session_not_watched)?;
        Ok(match watch.last_emitted {
            Some((waiting, reason)) => {
                WaitingState { waiting, reason: Some(reason), detected_by: Some(watch.latest.source), timestamp: watch.latest.timestamp }
            }
            None => WaitingState { waiting: false, reason: None, detected_by: None, timestamp: watch.latest.timestamp },
        })
    }

    pub async fn handle_hook_event(self: &Arc<Self>, payload: HookPayload) -> Result<()> {
        let waiting = !matches!(payload.reason, WaitingReason::Stopped);
        self.submit_candidate(payload.session_id, waiting, payload.reason, Source::Hook).await
    }

    pub async fn submit_output(self: &Arc<Self>, session_id: SessionId, lines: &[String], matcher: &crate::matcher::OutputMatcher) -> Result<()> {
        match matcher.scan(lines) {
            Some(reason) => self.submit_candidate(session_id, true, reason, Source::OutputMatcher).await,
            None => self.submit_candidate(session_id, false, WaitingReason::OutputPrompt, Source::OutputMatcher).await,
        }
    }

    pub async fn submit_telemetry_state(self: &Arc<Self>, session_id: SessionId, waiting: bool, reason: WaitingReason) -> Result<()> {
        self.submit_candidate(session_id, waiting, reason, Source::Telemetry).await
    }

    async fn submit_candidate(self: &Arc<Self>, session_id: SessionId, waiting: bool, reason: WaitingReason, source: Source) -> Result<()> {
        let now = self.clock.now_ms();
        let debounce = self.config.read().await.debounce;

        let mut sessions = self.sessions.write().await;
        let watch = sessions.get_mut(&session_id).ok_or_else(session_not_watched)?;
        watch.latest = Candidate { waiting, reason, source, timestamp: now };

        if waiting && matches!(watch.last_emitted, Some((true, _))) {
            self.restart_clear_timer(watch, session_id);
        }

        watch.debounce_cancel.cancel();
        let cancel = CancellationToken::new();
        watch.debounce_cancel = cancel.clone();
        drop(sessions);

        let detector = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(debounce) => detector.fire_debounced(session_id).await,
            }
        });
        Ok(())
    }

    fn restart_clear_timer(self: &Arc<Self>, watch: &mut SessionWatch, session_id: SessionId) {
        watch.clear_cancel.cancel();
        let cancel = CancellationToken::new();
        watch.clear_cancel = cancel.clone();
        let detector = Arc::clone(self);
        tokio::spawn(async move {
            let clear_delay = detector.config.read().await.clear_delay;
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(clear_delay) => detector.clear_stale(session_id).await,
            }
        });
    }

    async fn fire_debounced(self: Arc<Self>, session_id: SessionId) {
        let mut sessions = self.sessions.write().await;
        let Some(watch) = sessions.get_mut(&session_id) else { return };
        let candidate = watch.latest;
        let changed = watch.last_emitted.map(|(w, _)| w) != Some(candidate.waiting);
        if !changed {
            return;
        }
        watch.last_emitted = Some((candidate.waiting, candidate.reason));

        if candidate.waiting {
            self.restart_clear_timer(watch, session_id);
        } else {
            watch.clear_cancel.cancel();
        }
        drop(sessions);

        let _ = self.events_tx.send(WaitingEvent::StateChange {
            session_id,
            waiting: candidate.waiting,
            reason: Some(candidate.reason),
            detected_by: Some(candidate.source),
            timestamp: candidate.timestamp,
        });
    }

    async fn clear_stale(self: Arc<Self>, session_id: SessionId) {
        let now = self.clock.now_ms();
        let mut sessions = self.sessions.write().await;
        let Some(watch) = sessions.get_mut(&session_id) else { return };
        if !matches!(watch.last_emitted, Some((true, _))) {
            return;
        }
        let reason = watch.latest.reason;
        watch.last_emitted = Some((false, reason));
        watch.latest = Candidate { waiting: false, reason, source: Source::ClearTimeout, timestamp: now };
        drop(sessions);

        let _ = self.events_tx.send(WaitingEvent::StateChange {
            session_id,
            waiting: false,
            reason: Some(reason),
            detected_by: Some(Source::ClearTimeout),
            timestamp: now,
        });
    }
}

fn session_not_watched() -> Error {
    Error::not_found("session not watched")
}
