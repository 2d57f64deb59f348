// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-Handoff Orchestrator (§4.8): context-threshold-triggered rotation
//! of a ticket session onto a fresh pane, modeled as an explicit phased
//! choreography rather than one long function, in the spirit of the
//! teacher's `groom`/`switch` step sequences.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use sessions_context::{ContextEvent, ContextMonitor};
use sessions_core::error::{Error, Result};
use sessions_core::ids::{HandoffEventId, NotificationId, SessionId, TicketId};
use sessions_core::model::{
    HandoffEvent as HandoffEventRow, Notification, NotificationType, Session, SessionStatus, SessionType,
};
use sessions_core::pane::PaneId;
use sessions_core::time::Clock;
use sessions_multiplex::{MultiplexerAdapter, PaneSpec};
use sessions_repository::{Repository, SessionPatch};
use sessions_supervisor::Supervisor;

use crate::config::HandoffConfig;
use crate::events::{HandoffNotice, HandoffPhase};

const EVENT_QUEUE_DEPTH: usize = 256;

pub struct HandoffOrchestrator {
    repo: Arc<dyn Repository>,
    supervisor: Arc<Supervisor>,
    multiplexer: Arc<dyn MultiplexerAdapter>,
    context_monitor: Arc<ContextMonitor>,
    clock: Arc<dyn Clock>,
    config: HandoffConfig,
    events_tx: broadcast::Sender<HandoffNotice>,
    in_progress: RwLock<HashMap<SessionId, CancellationToken>>,
    subscription: Mutex<Option<CancellationToken>>,
}

impl HandoffOrchestrator {
    pub fn new(
        repo: Arc<dyn Repository>,
        supervisor: Arc<Supervisor>,
        multiplexer: Arc<dyn MultiplexerAdapter>,
        context_monitor: Arc<ContextMonitor>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Self::with_config(repo, supervisor, multiplexer, context_monitor, clock, HandoffConfig::default())
    }

    pub fn with_config(
        repo: Arc<dyn Repository>,
        supervisor: Arc<Supervisor>,
        multiplexer: Arc<dyn MultiplexerAdapter>,
        context_monitor: Arc<ContextMonitor>,
        clock: Arc<dyn Clock>,
        config: HandoffConfig,
    ) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(EVENT_QUEUE_DEPTH);
        Arc::new(Self {
            repo,
            supervisor,
            multiplexer,
            context_monitor,
            clock,
            config,
            events_tx,
            in_progress: RwLock::new(HashMap::new()),
            subscription: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HandoffNotice> {
        self.events_tx.subscribe()
    }

    /// Subscribes to `context:threshold`. Idempotent.
    pub async fn start(self: &Arc<Self>) {
        let mut guard = self.subscription.lock().await;
        if guard.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        *guard = Some(cancel.clone());
        drop(guard);

        let orchestrator = Arc::clone(self);
        let mut context_events = self.context_monitor.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = context_events.recv() => {
                        match event {
                            Ok(ContextEvent::Threshold { session_id, context_percent, .. }) => {
                                let orchestrator = Arc::clone(&orchestrator);
                                tokio::spawn(async move { orchestrator.trigger_handoff(session_id, context_percent).await });
                            }
                            Ok(ContextEvent::WaitingHint { .. }) => {}
                            Err(_) => return,
                        }
                    }
                }
            }
        });
    }

    /// Unsubscribes from `context:threshold`. Idempotent.
    pub async fn stop(&self) {
        if let Some(cancel) = self.subscription.lock().await.take() {
            cancel.cancel();
        }
    }

    pub async fn is_handoff_in_progress(&self, session_id: SessionId) -> bool {
        self.in_progress.read().await.contains_key(&session_id)
    }

    /// Cancels a pending handoff: removes timers, does not roll back
    /// already-performed side effects (§4.8).
    pub async fn cancel_handoff(&self, session_id: SessionId) -> Result<()> {
        let cancel = self.in_progress.write().await.remove(&session_id);
        match cancel {
            Some(cancel) => {
                cancel.cancel();
                let _ = self.events_tx.send(HandoffNotice::Failed { session_id, reason: "cancelled".into() });
                Ok(())
            }
            None => Err(Error::not_found(format!("no handoff in progress for session {session_id}"))),
        }
    }

    /// Runs the choreography for `session_id` directly; `start()` calls
    /// this for every `context:threshold` it observes, but it is public so
    /// callers (tests, a manual "hand off now" action) can invoke it
    /// without going through the subscription.
    pub async fn trigger_handoff(self: Arc<Self>, session_id: SessionId, context_percent: u8) {
        let session = match self.repo.get_session(session_id).await {
            Ok(s) => s,
            Err(_) => return,
        };
        if !matches!(session.session_type, SessionType::Ticket) || session.ticket_id.is_none() {
            return;
        }

        let cancel = CancellationToken::new();
        {
            let mut in_progress = self.in_progress.write().await;
            if in_progress.contains_key(&session_id) {
                let _ = self
                    .events_tx
                    .send(HandoffNotice::Failed { session_id, reason: "handoff already in progress".into() });
                return;
            }
            in_progress.insert(session_id, cancel.clone());
        }

        let result = self.perform(session.clone(), context_percent, cancel).await;
        self.in_progress.write().await.remove(&session_id);

        if let Err((reason, new_session_id)) = result {
            let _ = self.events_tx.send(HandoffNotice::Failed { session_id, reason: reason.clone() });
            if let Some(new_session_id) = new_session_id {
                let now = self.clock.now_ms();
                if let Err(e) = self
                    .repo
                    .update_session(
                        new_session_id,
                        SessionPatch { status: Some(SessionStatus::Error), ended_at: Some(Some(now)), ..Default::default() },
                    )
                    .await
                {
                    warn!(%new_session_id, error = %e, "failed to mark handoff pane as errored");
                }
            }
        }
    }

    fn emit(&self, notice: HandoffNotice) {
        let _ = self.events_tx.send(notice);
    }

    fn elapsed_ms(&self, since: i64) -> u64 {
        (self.clock.now_ms() - since).max(0) as u64
    }

    /// Returns `Err((reason, new_session_id))`; `new_session_id` is `Some`
    /// only once step 7 has inserted the replacement session row.
    async fn perform(
        &self,
        source: Session,
        context_percent: u8,
        cancel: CancellationToken,
    ) -> std::result::Result<(), (String, Option<SessionId>)> {
        let Some(ticket_id) = source.ticket_id else {
            return Err(("session has no ticket_id".into(), None));
        };
        let started_at = self.clock.now_ms();

        let ticket = self.repo.get_ticket(ticket_id).await.map_err(|e| (e.message, None))?;
        let project = self.repo.get_project(source.project_id).await.map_err(|e| (e.message, None))?;
        let handoff_path = Path::new(&project.repo_path).join(&project.handoff_path);

        let baseline_mtime = tokio::fs::metadata(&handoff_path).await.ok().and_then(|m| m.modified().ok());

        self.emit(HandoffNotice::Started { session_id: source.id, ticket_id, context_at_handoff: context_percent });

        let source_pane = PaneId::parse(source.pane_id.clone().unwrap_or_default())
            .map_err(|e| (e.message, None))?;

        self.emit(HandoffNotice::Progress { session_id: source.id, phase: HandoffPhase::Exporting, elapsed_ms: 0 });
        self.multiplexer.send_text(&source_pane, "/exportHandoff").await.map_err(|e| (e.message, None))?;

        if wait_or_cancelled(self.config.export_delay, &cancel).await.is_err() {
            return Err(("cancelled".into(), None));
        }

        self.emit(HandoffNotice::Progress {
            session_id: source.id,
            phase: HandoffPhase::WaitingFile,
            elapsed_ms: self.elapsed_ms(started_at),
        });
        self.wait_for_export(&handoff_path, baseline_mtime, &cancel).await.map_err(|e| (e, None))?;

        self.supervisor.stop_session(source.id, false).await.map_err(|e| (e.message, None))?;

        self.emit(HandoffNotice::Progress {
            session_id: source.id,
            phase: HandoffPhase::Spawning,
            elapsed_ms: self.elapsed_ms(started_at),
        });
        let spec = PaneSpec {
            window: project.multiplexer_window_name.clone(),
            split_axis: None,
            cwd: Some(project.repo_path.clone()),
            initial_command: Some(self.config.assistant_command.clone()),
        };
        let new_pane = self
            .multiplexer
            .create_pane(&project.multiplexer_session_name, spec)
            .await
            .map_err(|e| (e.message, None))?;

        let now = self.clock.now_ms();
        let new_session = Session {
            id: SessionId::new(),
            project_id: source.project_id,
            ticket_id: Some(ticket_id),
            parent_session_id: Some(source.id),
            session_type: SessionType::Ticket,
            status: SessionStatus::Starting,
            context_percent: None,
            pane_id: Some(new_pane.to_string()),
            started_at: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
        };
        let new_session = self.repo.create_session(new_session).await.map_err(|e| (e.message, None))?;
        if let Err(e) = self.supervisor.adopt_session(&new_session).await {
            return Err((e.message, Some(new_session.id)));
        }

        self.emit(HandoffNotice::Progress {
            session_id: source.id,
            phase: HandoffPhase::Importing,
            elapsed_ms: self.elapsed_ms(started_at),
        });
        if wait_or_cancelled(self.config.import_delay, &cancel).await.is_err() {
            return Err(("cancelled".into(), Some(new_session.id)));
        }

        self.multiplexer
            .send_text(&new_pane, "/importHandoff")
            .await
            .map_err(|e| (e.message, Some(new_session.id)))?;
        let continuation = match &ticket.external_id {
            Some(external_id) => format!("Continuing ticket {external_id}: {}", ticket.title),
            None => format!("Continuing ticket: {}", ticket.title),
        };
        self.multiplexer
            .send_text(&new_pane, &continuation)
            .await
            .map_err(|e| (e.message, Some(new_session.id)))?;

        let handoff_row = HandoffEventRow {
            id: HandoffEventId::new(),
            from_session_id: source.id,
            to_session_id: new_session.id,
            context_at_handoff: context_percent,
            created_at: self.clock.now_ms(),
        };
        self.repo.insert_handoff_event(handoff_row).await.map_err(|e| (e.message, Some(new_session.id)))?;

        let notification = Notification {
            id: NotificationId::new(),
            notification_type: NotificationType::HandoffComplete,
            message: format!("Handoff complete for ticket \"{}\"", ticket.title),
            session_id: Some(new_session.id),
            ticket_id: Some(ticket_id),
            dismissed: false,
            created_at: self.clock.now_ms(),
        };
        self.repo.insert_notification(notification).await.map_err(|e| (e.message, Some(new_session.id)))?;

        self.emit(HandoffNotice::Completed { from_session_id: source.id, to_session_id: new_session.id, ticket_id });
        Ok(())
    }

    async fn wait_for_export(
        &self,
        handoff_path: &Path,
        baseline_mtime: Option<std::time::SystemTime>,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), String> {
        let deadline = tokio::time::Instant::now() + self.config.timeout;
        loop {
            if let Ok(metadata) = tokio::fs::metadata(handoff_path).await {
                let advanced = match (baseline_mtime, metadata.modified().ok()) {
                    (Some(baseline), Some(current)) => current > baseline,
                    (None, Some(_)) => true,
                    _ => false,
                };
                if advanced {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err("handoff export wait timed out".into());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err("cancelled".into()),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }
}

async fn wait_or_cancelled(duration: Duration, cancel: &CancellationToken) -> std::result::Result<(), ()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(()),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
