// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Supervisor (§4.4): lifecycle, output polling, ring-buffered
//! history, event emission, startup reconciliation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sessions_core::error::{Error, ErrorKind, Result};
use sessions_core::ids::{ProjectId, SessionId, TicketId};
use sessions_core::model::{Session, SessionStatus, SessionType};
use sessions_core::pane::PaneId;
use sessions_core::ring::OutputRingBuffer;
use sessions_core::time::Clock;
use sessions_multiplex::{CaptureOptions, MultiplexerAdapter, PaneSpec};
use sessions_repository::{Repository, SessionPatch};

use crate::diff::{diff_capture, Diff};
use crate::events::SupervisorEvent;
use crate::registry::{ActiveSession, SessionRegistry};

/// Default poll cadence (§5 Timeouts).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Grace period between interrupt and EOF on a non-forced stop (§4.4).
pub const STOP_GRACE: Duration = Duration::from_secs(2);
/// Default ring buffer capacity (§3).
pub const DEFAULT_RING_CAPACITY: usize = 1000;
/// Outbound event queue depth (§9).
const EVENT_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct StartSessionRequest {
    pub project_id: ProjectId,
    pub ticket_id: Option<TicketId>,
    pub initial_prompt: Option<String>,
    pub cwd: Option<String>,
    pub assistant_command: Vec<String>,
}

pub struct Supervisor {
    repo: Arc<dyn Repository>,
    multiplexer: Arc<dyn MultiplexerAdapter>,
    clock: Arc<dyn Clock>,
    registry: SessionRegistry,
    events_tx: broadcast::Sender<SupervisorEvent>,
    poll_interval: Duration,
    ring_capacity: usize,
}

impl Supervisor {
    pub fn new(repo: Arc<dyn Repository>, multiplexer: Arc<dyn MultiplexerAdapter>, clock: Arc<dyn Clock>) -> Self {
        let (events_tx, _rx) = broadcast::channel(EVENT_QUEUE_DEPTH);
        Self {
            repo,
            multiplexer,
            clock,
            registry: SessionRegistry::new(),
            events_tx,
            poll_interval: DEFAULT_POLL_INTERVAL,
            ring_capacity: DEFAULT_RING_CAPACITY,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: SupervisorEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Startup reconciliation (§4.4): re-register live sessions, retire
    /// the rest.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let persisted = self.repo.list_sessions(None).await?;
        for session in persisted.into_iter().filter(|s| s.status.is_active()) {
            let alive = match &session.pane_id {
                Some(raw) => match PaneId::parse(raw.clone()) {
                    Ok(pane) => self.multiplexer.is_pane_alive(&pane).await.unwrap_or(false),
                    Err(_) => false,
                },
                None => false,
            };

            if alive {
                self.register_active(&session).await;
                self.spawn_poll_loop(session.id);
            } else {
                let now = self.clock.now_ms();
                let status = if matches!(session.status, SessionStatus::Starting) {
                    SessionStatus::Error
                } else {
                    SessionStatus::Completed
                };
                self.repo.mark_session_exited(session.id, status, now).await?;
                self.emit(SupervisorEvent::Status {
                    session_id: session.id,
                    previous: session.status,
                    new: status,
                    context_percent: session.context_percent,
                });
            }
        }
        Ok(())
    }

    async fn register_active(&self, session: &Session) {
        if let Some(raw_pane) = &session.pane_id {
            if let Ok(pane_id) = PaneId::parse(raw_pane.clone()) {
                self.registry
                    .insert(
                        session.id,
                        ActiveSession {
                            pane_id,
                            ring: Arc::new(
                                OutputRingBuffer::new(self.ring_capacity)
                                    .unwrap_or_else(|_| OutputRingBuffer::new(1).expect("capacity 1 is always valid")),
                            ),
                            last_capture: String::new(),
                            last_input_at: None,
                            poll_cancel: CancellationToken::new(),
                            pending_prompt: None,
                        },
                    )
                    .await;
            }
        }
    }

    pub async fn start_session(self: &Arc<Self>, request: StartSessionRequest) -> Result<Session> {
        let project = self.repo.get_project(request.project_id).await?;

        if let Some(ticket_id) = request.ticket_id {
            if let Some(existing) = self.repo.find_one_active_session(request.project_id, ticket_id).await? {
                return Err(Error::conflict(format!("ticket {ticket_id} already has an active session"))
                    .with_context(serde_json::json!({"existing_session_id": existing.id.to_string()})));
            }
        }

        let spec = PaneSpec {
            window: project.multiplexer_window_name.clone(),
            split_axis: None,
            cwd: Some(request.cwd.clone().unwrap_or_else(|| project.repo_path.clone())),
            initial_command: if request.assistant_command.is_empty() { None } else { Some(request.assistant_command.clone()) },
        };
        let pane_id = self.multiplexer.create_pane(&project.multiplexer_session_name, spec).await?;

        let now = self.clock.now_ms();
        let session = Session {
            id: SessionId::new(),
            project_id: request.project_id,
            ticket_id: request.ticket_id,
            parent_session_id: None,
            session_type: if request.ticket_id.is_some() { SessionType::Ticket } else { SessionType::Adhoc },
            status: SessionStatus::Starting,
            context_percent: None,
            pane_id: Some(pane_id.to_string()),
            started_at: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
        };
        let session = self.repo.create_session(session).await?;

        self.registry
            .insert(
                session.id,
                ActiveSession {
                    pane_id,
                    ring: Arc::new(
                        OutputRingBuffer::new(self.ring_capacity)
                            .unwrap_or_else(|_| OutputRingBuffer::new(1).expect("capacity 1 is always valid")),
                    ),
                    last_capture: String::new(),
                    last_input_at: None,
                    poll_cancel: CancellationToken::new(),
                    pending_prompt: request.initial_prompt.clone(),
                },
            )
            .await;

        self.spawn_poll_loop(session.id);

        Ok(session)
    }

    /// Registers a session created outside `start_session` (e.g. the
    /// handoff orchestrator's new pane) into the active registry and
    /// begins polling it, the same way startup reconciliation adopts a
    /// surviving pane.
    pub async fn adopt_session(self: &Arc<Self>, session: &Session) -> Result<()> {
        self.register_active(session).await;
        self.spawn_poll_loop(session.id);
        Ok(())
    }

    /// Enforces the one-running-session-per-ticket invariant (§3, §4.4).
    pub async fn start_ticket_session(
        self: &Arc<Self>,
        project_id: ProjectId,
        ticket_id: TicketId,
        initial_prompt: Option<String>,
        cwd: Option<String>,
        assistant_command: Vec<String>,
    ) -> Result<Session> {
        self.start_session(StartSessionRequest {
            project_id,
            ticket_id: Some(ticket_id),
            initial_prompt,
            cwd,
            assistant_command,
        })
        .await
    }

    pub async fn stop_session(self: &Arc<Self>, session_id: SessionId, force: bool) -> Result<()> {
        let session = self.repo.get_session(session_id).await?;
        let active = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| Error::not_found(format!("session {session_id} is not active")))?;

        let pane_id = { active.read().await.pane_id.clone() };

        if force {
            let _ = self.multiplexer.kill_pane(&pane_id).await;
        } else {
            let _ = self.multiplexer.send_interrupt(&pane_id).await;
            tokio::time::sleep(STOP_GRACE).await;
            let _ = self.multiplexer.send_eof(&pane_id).await;
        }

        { active.read().await.poll_cancel.cancel(); }
        self.registry.remove(session_id).await;

        let now = self.clock.now_ms();
        self.repo.mark_session_exited(session_id, SessionStatus::Completed, now).await?;
        self.emit(SupervisorEvent::Status {
            session_id,
            previous: session.status,
            new: SessionStatus::Completed,
            context_percent: session.context_percent,
        });
        Ok(())
    }

    pub async fn send_input(&self, session_id: SessionId, text: &str) -> Result<()> {
        let session = self.repo.get_session(session_id).await?;
        if !matches!(session.status, SessionStatus::Running | SessionStatus::Paused) {
            return Err(Error::new(ErrorKind::Invariant, format!("session {session_id} is not running (status={:?})", session.status)));
        }
        let active = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| Error::not_found(format!("session {session_id} is not active")))?;
        let pane_id = { active.read().await.pane_id.clone() };
        self.multiplexer.send_text(&pane_id, text).await?;
        let now = self.clock.now_ms();
        active.write().await.last_input_at = Some(now);
        Ok(())
    }

    pub async fn get_session_output(&self, session_id: SessionId, lines: usize) -> Result<Vec<String>> {
        let active = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| Error::not_found(format!("session {session_id} is not active")))?;
        let ring = { active.read().await.ring.clone() };
        Ok(ring.last(lines))
    }

    pub async fn get_active_session(&self, session_id: SessionId) -> Result<Session> {
        self.repo.get_session(session_id).await
    }

    pub async fn list_active_sessions(&self, project_id: Option<ProjectId>) -> Result<Vec<Session>> {
        let sessions = self.repo.list_sessions(project_id).await?;
        Ok(sessions.into_iter().filter(|s| s.status.is_active()).collect())
    }

    fn spawn_poll_loop(self: &Arc<Self>, session_id: SessionId) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            supervisor.poll_loop(session_id).await;
        });
    }

    async fn poll_loop(self: Arc<Self>, session_id: SessionId) {
        let active = match self.registry.get(session_id).await {
            Some(a) => a,
            None => return,
        };
        let cancel = { active.read().await.poll_cancel.clone() };
        let mut interval = tokio::time::interval(self.poll_interval);
        let mut became_running = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    let pane_id = { active.read().await.pane_id.clone() };

                    let alive = self.multiplexer.is_pane_alive(&pane_id).await.unwrap_or(false);
                    if !alive {
                        self.handle_pane_death(session_id).await;
                        return;
                    }

                    if !became_running {
                        became_running = true;
                        if let Err(e) = self.transition_to_running(session_id).await {
                            warn!(%session_id, error = %e, "failed to mark session running");
                        }
                        let prompt = { active.write().await.pending_prompt.take() };
                        if let Some(prompt) = prompt {
                            if let Err(e) = self.multiplexer.send_text(&pane_id, &prompt).await {
                                warn!(%session_id, error = %e, "failed to deliver initial prompt");
                            }
                        }
                    }

                    let capture = match self.multiplexer.capture_pane(&pane_id, CaptureOptions { strip_control_sequences: true, ..Default::default() }).await {
                        Ok(c) => c,
                        Err(e) => {
                            debug!(%session_id, error = %e, "capture_pane failed, will retry");
                            continue;
                        }
                    };

                    let prev_capture = { active.read().await.last_capture.clone() };
                    let diff = diff_capture(&prev_capture, &capture);
                    { active.write().await.last_capture = capture.clone(); }

                    let lines = match diff {
                        Diff::Unchanged => continue,
                        Diff::Appended(lines) | Diff::Reset(lines) => lines,
                    };
                    if lines.is_empty() {
                        continue;
                    }

                    let ring = { active.read().await.ring.clone() };
                    ring.push_many(lines.iter().cloned());
                    self.emit(SupervisorEvent::Output { session_id, lines });
                }
            }
        }
    }

    async fn transition_to_running(&self, session_id: SessionId) -> Result<()> {
        let session = self.repo.get_session(session_id).await?;
        if !matches!(session.status, SessionStatus::Starting) {
            return Ok(());
        }
        let now = self.clock.now_ms();
        self.repo
            .update_session(
                session_id,
                sessions_repository::SessionPatch {
                    status: Some(SessionStatus::Running),
                    started_at: Some(Some(now)),
                    ..SessionPatch::default()
                },
            )
            .await?;
        self.emit(SupervisorEvent::Status {
            session_id,
            previous: SessionStatus::Starting,
            new: SessionStatus::Running,
            context_percent: session.context_percent,
        });
        Ok(())
    }

    async fn handle_pane_death(&self, session_id: SessionId) {
        let session = match self.repo.get_session(session_id).await {
            Ok(s) => s,
            Err(_) => return,
        };
        self.registry.remove(session_id).await;
        let now = self.clock.now_ms();
        if self.repo.mark_session_exited(session_id, SessionStatus::Completed, now).await.is_ok() {
            self.emit(SupervisorEvent::Exit { session_id, exit_code: None });
            self.emit(SupervisorEvent::Status {
                session_id,
                previous: session.status,
                new: SessionStatus::Completed,
                context_percent: session.context_percent,
            });
        }
    }
}

