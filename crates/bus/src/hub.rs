// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry and event fan-out (§4.9, §5).
//!
//! Mirrors the teacher's `WsBridge`: a map from connection id to a
//! per-connection channel, with subscription filtering applied once before
//! fan-out rather than inside each connection's loop. The bus itself never
//! blocks on a slow client: the per-connection channel is unbounded, and a
//! client that can't keep up simply accumulates backlog until it
//! disconnects.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::Engine;
use tokio::sync::{broadcast, mpsc, RwLock};

use sessions_context::ContextEvent;
use sessions_core::error::Result;
use sessions_core::ids::SessionId;
use sessions_core::model::{Notification, NotificationType};
use sessions_handoff::HandoffNotice;
use sessions_pty::PtyEvent;
use sessions_repository::Repository;
use sessions_supervisor::SupervisorEvent;
use sessions_tickets::TicketEvent;
use sessions_waiting::WaitingEvent;

use crate::messages::{
    ContextThresholdPayload, NotificationPayload, PtyExitPayload, PtyOutputPayload, ReviewResultPayload,
    ServerMessage, SessionExitPayload, SessionOutputPayload, SessionStatusPayload, SessionWaitingPayload,
    TicketStatePayload,
};

pub type ConnId = u64;

struct ConnectionSlot {
    tx: mpsc::UnboundedSender<ServerMessage>,
    subscriptions: HashSet<SessionId>,
}

/// Shared fan-out hub. Holds no per-connection I/O; `crate::handler` owns
/// the actual WebSocket sockets.
pub struct FanoutHub {
    repo: Arc<dyn Repository>,
    connections: RwLock<HashMap<ConnId, ConnectionSlot>>,
    next_conn_id: AtomicU64,
}

impl FanoutHub {
    pub fn new(repo: Arc<dyn Repository>) -> Arc<Self> {
        Arc::new(Self { repo, connections: RwLock::new(HashMap::new()), next_conn_id: AtomicU64::new(1) })
    }

    pub async fn register(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().await.insert(id, ConnectionSlot { tx, subscriptions: HashSet::new() });
        (id, rx)
    }

    pub async fn unregister(&self, id: ConnId) {
        self.connections.write().await.remove(&id);
    }

    /// Verifies the session exists, then adds it to the connection's set.
    pub async fn subscribe(&self, id: ConnId, session_id: SessionId) -> Result<()> {
        self.repo.get_session(session_id).await?;
        if let Some(slot) = self.connections.write().await.get_mut(&id) {
            slot.subscriptions.insert(session_id);
        }
        Ok(())
    }

    pub async fn unsubscribe(&self, id: ConnId, session_id: SessionId) {
        if let Some(slot) = self.connections.write().await.get_mut(&id) {
            slot.subscriptions.remove(&session_id);
        }
    }

    pub async fn is_subscribed(&self, id: ConnId, session_id: SessionId) -> bool {
        self.connections.read().await.get(&id).is_some_and(|s| s.subscriptions.contains(&session_id))
    }

    /// Delivers a message addressed to exactly one connection, bypassing
    /// the subscription set entirely. Used for PTY streams, which are
    /// per-connection rather than per-session broadcast (see
    /// `crate::handler`'s connection id encoding).
    pub async fn send_to(&self, id: ConnId, msg: ServerMessage) {
        if let Some(slot) = self.connections.read().await.get(&id) {
            let _ = slot.tx.send(msg);
        }
    }

    async fn dispatch_to_subscribers(&self, session_id: SessionId, msg: ServerMessage) {
        let targets: Vec<_> = self
            .connections
            .read()
            .await
            .iter()
            .filter(|(_, slot)| slot.subscriptions.contains(&session_id))
            .map(|(_, slot)| slot.tx.clone())
            .collect();
        for tx in targets {
            let _ = tx.send(msg.clone());
        }
    }

    async fn dispatch_to_all(&self, msg: ServerMessage) {
        let targets: Vec<_> = self.connections.read().await.values().map(|slot| slot.tx.clone()).collect();
        for tx in targets {
            let _ = tx.send(msg.clone());
        }
    }

    /// Spawns the background tasks that translate each component's domain
    /// events into wire messages and fan them out (§9: "the bus is the
    /// mediator"). The hub never calls back into these components; it only
    /// listens.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn_bridges(
        self: &Arc<Self>,
        supervisor_rx: broadcast::Receiver<SupervisorEvent>,
        context_rx: broadcast::Receiver<ContextEvent>,
        waiting_rx: broadcast::Receiver<WaitingEvent>,
        ticket_rx: broadcast::Receiver<TicketEvent>,
        handoff_rx: broadcast::Receiver<HandoffNotice>,
        pty_rx: mpsc::UnboundedReceiver<PtyEvent>,
    ) {
        tokio::spawn(run_supervisor_bridge(Arc::clone(self), supervisor_rx));
        tokio::spawn(run_context_bridge(Arc::clone(self), context_rx));
        tokio::spawn(run_waiting_bridge(Arc::clone(self), waiting_rx));
        tokio::spawn(run_ticket_bridge(Arc::clone(self), ticket_rx));
        tokio::spawn(run_handoff_bridge(Arc::clone(self), handoff_rx));
        tokio::spawn(run_pty_bridge(Arc::clone(self), pty_rx));
    }

    /// Broadcasts a freshly persisted notification to every connection
    /// (§4.9: notifications are the one event type not scoped to
    /// subscribers). Called by the assembly layer right after the
    /// notification is inserted into the repository.
    pub async fn emit_notification(&self, notification: &Notification) {
        let title = notification_title(notification.notification_type).to_string();
        self.dispatch_to_all(ServerMessage::Notification {
            payload: NotificationPayload {
                id: notification.id.to_string(),
                title,
                body: notification.message.clone(),
            },
        })
        .await;
    }
}

fn notification_title(kind: NotificationType) -> &'static str {
    match kind {
        NotificationType::WaitingInput => "Waiting for input",
        NotificationType::ReviewReady => "Ready for review",
        NotificationType::HandoffComplete => "Handoff complete",
        NotificationType::Error => "Error",
        NotificationType::ContextLow => "Context running low",
    }
}

async fn run_supervisor_bridge(hub: Arc<FanoutHub>, mut rx: broadcast::Receiver<SupervisorEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(e) => e,
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        };
        match event {
            SupervisorEvent::Output { session_id, lines } => {
                let raw = lines.join("\n");
                hub.dispatch_to_subscribers(
                    session_id,
                    ServerMessage::SessionOutput { payload: SessionOutputPayload { session_id, lines, raw } },
                )
                .await;
            }
            SupervisorEvent::Status { session_id, previous, new, context_percent } => {
                hub.dispatch_to_subscribers(
                    session_id,
                    ServerMessage::SessionStatus {
                        payload: SessionStatusPayload {
                            session_id,
                            previous_status: previous,
                            new_status: new,
                            context_percent,
                        },
                    },
                )
                .await;
            }
            SupervisorEvent::Exit { session_id, exit_code } => {
                hub.dispatch_to_subscribers(
                    session_id,
                    ServerMessage::SessionExit { payload: SessionExitPayload { session_id, exit_code } },
                )
                .await;
            }
            SupervisorEvent::Error { session_id, message } => {
                hub.dispatch_to_subscribers(
                    session_id,
                    ServerMessage::error(crate::messages::ErrorCode::Internal, message),
                )
                .await;
            }
        }
    }
}

async fn run_context_bridge(hub: Arc<FanoutHub>, mut rx: broadcast::Receiver<ContextEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(e) => e,
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        };
        match event {
            ContextEvent::Threshold { session_id, context_percent, threshold, .. } => {
                hub.dispatch_to_subscribers(
                    session_id,
                    ServerMessage::ContextThreshold {
                        payload: ContextThresholdPayload { session_id, context_percent, threshold },
                    },
                )
                .await;
            }
            ContextEvent::WaitingHint { .. } => {}
        }
    }
}

async fn run_waiting_bridge(hub: Arc<FanoutHub>, mut rx: broadcast::Receiver<WaitingEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(e) => e,
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        };
        let WaitingEvent::StateChange { session_id, waiting, reason, .. } = event;
        hub.dispatch_to_subscribers(
            session_id,
            ServerMessage::SessionWaiting {
                payload: SessionWaitingPayload { session_id, waiting, reason: reason.map(|r| r.as_str().to_string()) },
            },
        )
        .await;
    }
}

async fn run_ticket_bridge(hub: Arc<FanoutHub>, mut rx: broadcast::Receiver<TicketEvent>) {
    use sessions_core::model::TransitionReason;

    loop {
        let event = match rx.recv().await {
            Ok(e) => e,
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        };
        let TicketEvent::StateChange { ticket_id, from_state, to_state, trigger, reason, feedback, session_id } = event;

        // ticket:state always fires; review:result additionally fires when
        // the transition was a review decision (§4.7 reasons).
        hub.dispatch_to_all(ServerMessage::TicketState {
            payload: TicketStatePayload { ticket_id, previous_state: from_state, new_state: to_state, trigger, reason },
        })
        .await;

        let decision = match reason {
            TransitionReason::UserApproved | TransitionReason::ReviewerApproved => Some("approved"),
            TransitionReason::UserRejected | TransitionReason::ReviewerRejected => Some("rejected"),
            _ => None,
        };
        if let Some(decision) = decision {
            hub.dispatch_to_all(ServerMessage::ReviewResult {
                payload: ReviewResultPayload {
                    ticket_id,
                    session_id,
                    trigger,
                    decision: decision.to_string(),
                    reasoning: feedback,
                },
            })
            .await;
        }
    }
}

async fn run_handoff_bridge(hub: Arc<FanoutHub>, mut rx: broadcast::Receiver<HandoffNotice>) {
    loop {
        let event = match rx.recv().await {
            Ok(e) => e,
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        };
        if let HandoffNotice::Failed { session_id, reason } = event {
            hub.dispatch_to_subscribers(session_id, ServerMessage::error(crate::messages::ErrorCode::Internal, reason))
                .await;
        }
        // `Completed`/`Started`/`Progress` surface to clients as the normal
        // session:status / notification events the supervisor and
        // repository already produce around the handoff; no separate wire
        // message is defined for them in §4.9.
    }
}

async fn run_pty_bridge(hub: Arc<FanoutHub>, mut rx: mpsc::UnboundedReceiver<PtyEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            PtyEvent::Data { connection_id, session_id, bytes } => {
                if let Some(conn_id) = crate::handler::decode_pty_connection(&connection_id) {
                    let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
                    hub.send_to(
                        conn_id,
                        ServerMessage::PtyOutput { payload: PtyOutputPayload { session_id, data } },
                    )
                    .await;
                }
            }
            PtyEvent::Exit { connection_id, session_id, exit_code, .. } => {
                if let Some(conn_id) = crate::handler::decode_pty_connection(&connection_id) {
                    hub.send_to(
                        conn_id,
                        ServerMessage::PtyExit { payload: PtyExitPayload { session_id, exit_code } },
                    )
                    .await;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
