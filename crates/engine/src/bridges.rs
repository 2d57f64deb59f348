// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wiring the components' independent broadcast channels together without
//! letting any of them hold a reference to another (§9: "the bus is the
//! mediator"). Each function here owns one subscription and reacts to it;
//! none of them call back into the source they're reading from.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use sessions_bus::FanoutHub;
use sessions_context::ContextMonitor;
use sessions_core::ids::NotificationId;
use sessions_core::model::{Notification, NotificationType, SessionStatus};
use sessions_core::time::Clock;
use sessions_repository::Repository;
use sessions_supervisor::SupervisorEvent;
use sessions_tickets::TicketEvent;
use sessions_waiting::{OutputMatcher, WaitingDetector, WaitingEvent};

use crate::config::telemetry_path;

/// Feeds Supervisor output into the Waiting Detector's pattern matcher and
/// keeps the Waiting Detector's and Context Monitor's per-session watch
/// lists in sync with session lifecycle transitions.
pub async fn run_supervisor_wiring(
    mut rx: broadcast::Receiver<SupervisorEvent>,
    waiting: Arc<WaitingDetector>,
    context: Arc<ContextMonitor>,
    matcher: Arc<OutputMatcher>,
    telemetry_dir: PathBuf,
) {
    loop {
        let event = match rx.recv().await {
            Ok(e) => e,
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        };
        match event {
            SupervisorEvent::Output { session_id, lines } => {
                if let Err(e) = waiting.submit_output(session_id, &lines, &matcher).await {
                    debug!(%session_id, error = %e, "dropping output sample for unwatched session");
                }
            }
            SupervisorEvent::Status { session_id, previous, new, .. } => {
                if matches!(previous, SessionStatus::Starting) && matches!(new, SessionStatus::Running) {
                    waiting.watch_session(session_id).await;
                    let path = telemetry_path(&telemetry_dir, session_id);
                    if let Err(e) = context.watch(session_id, path).await {
                        warn!(%session_id, error = %e, "failed to start context monitoring");
                    }
                } else if matches!(new, SessionStatus::Completed | SessionStatus::Error) {
                    waiting.unwatch_session(session_id).await;
                    context.unwatch(session_id).await;
                }
            }
            SupervisorEvent::Exit { .. } | SupervisorEvent::Error { .. } => {}
        }
    }
}

/// Turns a waiting=true transition into a persisted, fanned-out
/// notification (§8 scenario 1). waiting=false transitions are not
/// notification-worthy.
pub async fn run_waiting_notifications(
    mut rx: broadcast::Receiver<WaitingEvent>,
    repo: Arc<dyn Repository>,
    hub: Arc<FanoutHub>,
    clock: Arc<dyn Clock>,
) {
    loop {
        let event = match rx.recv().await {
            Ok(e) => e,
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        };
        let WaitingEvent::StateChange { session_id, waiting: true, reason, .. } = event else { continue };

        let message = match reason {
            Some(reason) => format!("Session is waiting for input ({})", reason.as_str()),
            None => "Session is waiting for input".to_string(),
        };
        let notification = Notification {
            id: NotificationId::new(),
            notification_type: NotificationType::WaitingInput,
            message,
            session_id: Some(session_id),
            ticket_id: None,
            dismissed: false,
            created_at: clock.now_ms(),
        };
        persist_and_emit(&repo, &hub, notification).await;
    }
}

/// Turns a transition into `review` into a persisted, fanned-out
/// notification. Other ticket transitions already surface as `ticket:state`
/// / `review:result` via `sessions_bus`'s own ticket bridge.
pub async fn run_ticket_notifications(
    mut rx: broadcast::Receiver<TicketEvent>,
    repo: Arc<dyn Repository>,
    hub: Arc<FanoutHub>,
    clock: Arc<dyn Clock>,
) {
    use sessions_core::model::TicketState;

    loop {
        let event = match rx.recv().await {
            Ok(e) => e,
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        };
        let TicketEvent::StateChange { ticket_id, to_state: TicketState::Review, .. } = event else { continue };

        let notification = Notification {
            id: NotificationId::new(),
            notification_type: NotificationType::ReviewReady,
            message: format!("Ticket {ticket_id} is ready for review"),
            session_id: None,
            ticket_id: Some(ticket_id),
            dismissed: false,
            created_at: clock.now_ms(),
        };
        persist_and_emit(&repo, &hub, notification).await;
    }
}

async fn persist_and_emit(repo: &Arc<dyn Repository>, hub: &Arc<FanoutHub>, notification: Notification) {
    match repo.insert_notification(notification).await {
        Ok(persisted) => hub.emit_notification(&persisted).await,
        Err(e) => warn!(error = %e, "failed to persist notification"),
    }
}
