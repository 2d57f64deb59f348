// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level assembly (§9 Design Notes: "constructed by a top-level
//! assembly function; tests instantiate them directly"). Grounded on the
//! teacher's `coop_mux::run` in shape — one function builds every owned
//! lifecycle and wires their channels together — generalized from a single
//! `axum::serve` call into a bundle of components the (out-of-scope) HTTP
//! layer mounts and drives.

use std::sync::Arc;

use tokio::sync::mpsc;

use sessions_bus::{BusState, FanoutHub};
use sessions_context::ContextMonitor;
use sessions_core::error::Result;
use sessions_core::ids::{ProjectId, TicketId};
use sessions_core::model::{Session, TransitionReason, TransitionTrigger};
use sessions_core::time::Clock;
use sessions_handoff::HandoffOrchestrator;
use sessions_multiplex::MultiplexerAdapter;
use sessions_pty::PtyAttachment;
use sessions_repository::Repository;
use sessions_supervisor::Supervisor;
use sessions_tickets::TicketWorkflow;
use sessions_waiting::{OutputMatcher, WaitingDetector};

use crate::bridges::{run_supervisor_wiring, run_ticket_notifications, run_waiting_notifications};
use crate::config::EngineConfig;

/// Every owned lifecycle named in §9, held together so the out-of-scope
/// HTTP layer can start one thing and mount one router.
pub struct Engine {
    pub repo: Arc<dyn Repository>,
    pub multiplexer: Arc<dyn MultiplexerAdapter>,
    pub clock: Arc<dyn Clock>,
    pub supervisor: Arc<Supervisor>,
    pub context_monitor: Arc<ContextMonitor>,
    pub waiting_detector: Arc<WaitingDetector>,
    pub ticket_workflow: Arc<TicketWorkflow>,
    pub handoff_orchestrator: Arc<HandoffOrchestrator>,
    pub pty: Arc<PtyAttachment>,
    pub hub: Arc<FanoutHub>,
    pub bus_state: Arc<BusState>,
    config: EngineConfig,
}

/// Builds every component and wires their event channels together, but
/// starts nothing (§9: owned lifecycles have explicit start/stop). Call
/// [`Engine::start`] to begin polling, monitoring, and serving traffic.
pub fn assemble(
    repo: Arc<dyn Repository>,
    multiplexer: Arc<dyn MultiplexerAdapter>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
) -> Arc<Engine> {
    let supervisor = Arc::new(Supervisor::new(repo.clone(), multiplexer.clone(), clock.clone()));
    let context_monitor = Arc::new(ContextMonitor::new(clock.clone()));
    let waiting_detector = Arc::new(WaitingDetector::new(clock.clone()));
    let ticket_workflow = Arc::new(TicketWorkflow::new(repo.clone(), supervisor.clone(), clock.clone()));
    let handoff_orchestrator = HandoffOrchestrator::with_config(
        repo.clone(),
        supervisor.clone(),
        multiplexer.clone(),
        context_monitor.clone(),
        clock.clone(),
        config.handoff.clone(),
    );

    let (pty_events_tx, pty_events_rx) = mpsc::unbounded_channel();
    let pty = Arc::new(PtyAttachment::new(multiplexer.clone(), pty_events_tx));

    let hub = FanoutHub::new(repo.clone());
    hub.spawn_bridges(
        supervisor.subscribe(),
        context_monitor.subscribe(),
        waiting_detector.subscribe(),
        ticket_workflow.subscribe(),
        handoff_orchestrator.subscribe(),
        pty_events_rx,
    );

    let bus_state = Arc::new(BusState {
        hub: hub.clone(),
        repo: repo.clone(),
        supervisor: supervisor.clone(),
        pty: pty.clone(),
        clock: clock.clone(),
        config: config.bus.clone(),
    });

    Arc::new(Engine {
        repo,
        multiplexer,
        clock,
        supervisor,
        context_monitor,
        waiting_detector,
        ticket_workflow,
        handoff_orchestrator,
        pty,
        hub,
        bus_state,
        config,
    })
}

impl Engine {
    /// Reconciles persisted sessions, subscribes the handoff orchestrator
    /// to context thresholds, and spawns the cross-component wiring tasks.
    /// Idempotent with respect to the handoff orchestrator's own
    /// subscription; calling it twice spawns duplicate wiring tasks, so
    /// callers should call it once per process.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.supervisor.start().await?;
        self.handoff_orchestrator.start().await;

        tokio::spawn(run_supervisor_wiring(
            self.supervisor.subscribe(),
            self.waiting_detector.clone(),
            self.context_monitor.clone(),
            Arc::new(OutputMatcher::new()),
            self.config.telemetry_dir.clone(),
        ));
        tokio::spawn(run_waiting_notifications(
            self.waiting_detector.subscribe(),
            self.repo.clone(),
            self.hub.clone(),
            self.clock.clone(),
        ));
        tokio::spawn(run_ticket_notifications(
            self.ticket_workflow.subscribe(),
            self.repo.clone(),
            self.hub.clone(),
            self.clock.clone(),
        ));

        Ok(())
    }

    /// Starts a ticket session and immediately advances the ticket to
    /// `in_progress` (§8 scenario 1). The two are not wrapped in a single
    /// repository transaction: a failure of the transition after the
    /// session was created leaves an orphaned `starting` session rather
    /// than rolling back the pane, matching the Supervisor's own
    /// best-effort failure handling elsewhere.
    pub async fn start_ticket_session(
        self: &Arc<Self>,
        project_id: ProjectId,
        ticket_id: TicketId,
        initial_prompt: Option<String>,
        cwd: Option<String>,
        assistant_command: Vec<String>,
    ) -> Result<Session> {
        let session = self
            .supervisor
            .start_ticket_session(project_id, ticket_id, initial_prompt, cwd, assistant_command)
            .await?;

        self.ticket_workflow
            .transition(
                ticket_id,
                sessions_core::model::TicketState::InProgress,
                TransitionTrigger::Auto,
                TransitionReason::SessionStarted,
                Some(session.id),
                None,
            )
            .await?;

        Ok(session)
    }

    /// Stops the supervisor's polling for every active session and
    /// unsubscribes the handoff orchestrator (§9: "stopping the Supervisor
    /// cancels every child task"). Does not drain in-flight WebSocket
    /// sends; that 2 s grace period is the bus's per-connection loop's
    /// responsibility when its socket closes, not this function's.
    pub async fn stop(&self) {
        self.handoff_orchestrator.stop().await;
        if let Ok(sessions) = self.supervisor.list_active_sessions(None).await {
            for session in sessions {
                let _ = self.supervisor.stop_session(session.id, true).await;
            }
        }
    }

    pub fn router(&self) -> axum::Router {
        sessions_bus::router(self.bus_state.clone())
    }
}

/// Convenience used by tests and the (out-of-scope) hook-ingestion layer:
/// routes an external lifecycle hook straight into the Waiting Detector.
pub async fn submit_waiting_hook(engine: &Arc<Engine>, payload: sessions_waiting::HookPayload) -> Result<()> {
    engine.waiting_detector.clone().handle_hook_event(payload).await
}
