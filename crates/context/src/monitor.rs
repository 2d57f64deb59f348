// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context Monitor (§4.5): tails each session's telemetry file, tracks
//! the latest context-remaining reading, and raises a `Threshold` event
//! exactly once per excursion below the configured floor.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use sessions_core::error::{Error, Result};
use sessions_core::ids::SessionId;
use sessions_core::time::{Clock, EpochMillis};

use crate::record::TelemetryRecord;
use crate::telemetry::TelemetryTailer;

pub const DEFAULT_THRESHOLD_PERCENT: u8 = 20;
pub const DEFAULT_HYSTERESIS_PERCENT: u8 = 5;
pub const EVENT_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSample {
    pub session_id: SessionId,
    pub context_percent: u8,
    pub timestamp: EpochMillis,
}

/// unknown -> measuring -> {above, below}. `Measuring` is the transient
/// state held while the first sample for a session is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExcursionState {
    Unknown,
    Measuring,
    Above,
    Below,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEvent {
    Threshold { session_id: SessionId, context_percent: u8, threshold: u8, timestamp: EpochMillis },
    WaitingHint { session_id: SessionId, waiting_state: String, timestamp: EpochMillis },
}

struct SessionState {
    sample: Option<ContextSample>,
    excursion: ExcursionState,
}

struct WatchHandle {
    cancel: CancellationToken,
    tailer_task: tokio::task::JoinHandle<()>,
    consumer_task: tokio::task::JoinHandle<()>,
}

pub struct ContextMonitor {
    clock: Arc<dyn Clock>,
    handles: RwLock<HashMap<SessionId, WatchHandle>>,
    state: RwLock<HashMap<SessionId, SessionState>>,
    events_tx: broadcast::Sender<ContextEvent>,
    threshold: u8,
    hysteresis: u8,
    poll_interval: Duration,
}

impl ContextMonitor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_QUEUE_DEPTH);
        Self {
            clock,
            handles: RwLock::new(HashMap::new()),
            state: RwLock::new(HashMap::new()),
            events_tx,
            threshold: DEFAULT_THRESHOLD_PERCENT,
            hysteresis: DEFAULT_HYSTERESIS_PERCENT,
            poll_interval: crate::telemetry::DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_threshold(mut self, threshold: u8, hysteresis: u8) -> Self {
        self.threshold = threshold;
        self.hysteresis = hysteresis;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.events_tx.subscribe()
    }

    /// Begins tailing `file_path` for `session_id`. Replaces any existing
    /// watch for the same session.
    pub async fn watch(self: &Arc<Self>, session_id: SessionId, file_path: PathBuf) -> Result<()> {
        self.unwatch(session_id).await;

        self.state.write().await.insert(session_id, SessionState { sample: None, excursion: ExcursionState::Unknown });

        let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
        let cancel = CancellationToken::new();

        let tailer = TelemetryTailer::new(file_path).with_poll_interval(self.poll_interval);
        let tailer_cancel = cancel.clone();
        let tailer_task = tokio::spawn(async move {
            tailer.run(line_tx, tailer_cancel).await;
        });

        let monitor = Arc::clone(self);
        let consumer_cancel = cancel.clone();
        let consumer_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = consumer_cancel.cancelled() => break,
                    line = line_rx.recv() => {
                        match line {
                            Some(line) => monitor.process_line(session_id, &line).await,
                            None => break,
                        }
                    }
                }
            }
        });

        self.handles.write().await.insert(session_id, WatchHandle { cancel, tailer_task, consumer_task });
        Ok(())
    }

    pub async fn unwatch(&self, session_id: SessionId) {
        if let Some(handle) = self.handles.write().await.remove(&session_id) {
            handle.cancel.cancel();
            handle.tailer_task.abort();
            handle.consumer_task.abort();
        }
        self.state.write().await.remove(&session_id);
    }

    pub async fn is_monitoring(&self, session_id: SessionId) -> bool {
        self.handles.read().await.contains_key(&session_id)
    }

    pub async fn get_session_context(&self, session_id: SessionId) -> Option<ContextSample> {
        self.state.read().await.get(&session_id).and_then(|s| s.sample)
    }

    async fn process_line(&self, session_id: SessionId, line: &str) {
        let record: TelemetryRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(session_id = %session_id, error = %err, line, "skipping malformed telemetry record");
                return;
            }
        };

        let now = self.clock.now_ms();

        if let Some(waiting_state) = record.waiting_state.clone() {
            let _ = self.events_tx.send(ContextEvent::WaitingHint { session_id, waiting_state, timestamp: now });
        }

        let Some(percent) = record.context_remaining_percent else { return };
        self.observe_percent(session_id, percent, now).await;
    }

    async fn observe_percent(&self, session_id: SessionId, percent: u8, now: EpochMillis) {
        let mut state = self.state.write().await;
        let entry = state
            .entry(session_id)
            .or_insert_with(|| SessionState { sample: None, excursion: ExcursionState::Unknown });
        entry.sample = Some(ContextSample { session_id, context_percent: percent, timestamp: now });

        let below = percent < self.threshold;
        let recovered = percent >= self.threshold.saturating_add(self.hysteresis);

        let fire = match entry.excursion {
            ExcursionState::Unknown | ExcursionState::Measuring => below,
            ExcursionState::Above => below,
            ExcursionState::Below => false,
        };

        entry.excursion = match entry.excursion {
            ExcursionState::Below if recovered => ExcursionState::Above,
            ExcursionState::Below => ExcursionState::Below,
            _ if below => ExcursionState::Below,
            _ => ExcursionState::Above,
        };
        drop(state);

        if fire {
            let _ = self.events_tx.send(ContextEvent::Threshold {
                session_id,
                context_percent: percent,
                threshold: self.threshold,
                timestamp: now,
            });
        }
    }
}

impl std::fmt::Debug for ContextMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextMonitor").field("threshold", &self.threshold).field("hysteresis", &self.hysteresis).finish()
    }
}

pub fn validation_error_for_threshold(threshold: u8) -> Result<()> {
    if threshold == 0 || threshold >= 100 {
        return Err(Error::validation("threshold must be between 1 and 99"));
    }
    Ok(())
}
