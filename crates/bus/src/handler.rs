// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket upgrade and per-connection event loop (§4.9).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use base64::Engine;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};

use sessions_core::error::{Error, ErrorKind};
use sessions_core::pane::PaneId;
use sessions_core::time::Clock;
use sessions_pty::{ConnectionId as PtyConnectionId, PtyAttachment};
use sessions_repository::Repository;
use sessions_supervisor::Supervisor;

use crate::config::BusConfig;
use crate::connection::{encode_pty_connection, ConnectionContext};
use crate::hub::{ConnId, FanoutHub};
use crate::messages::{
    ClientMessage, ErrorCode, PongPayload, PtyAttachPayload, PtyResizePayload, PtyWritePayload, ServerMessage,
    SessionIdPayload, SessionInputPayload, SubscribedPayload,
};

const MAX_SESSION_INPUT_CHARS: usize = 10_000;

pub struct BusState {
    pub hub: Arc<FanoutHub>,
    pub repo: Arc<dyn Repository>,
    pub supervisor: Arc<Supervisor>,
    pub pty: Arc<PtyAttachment>,
    pub clock: Arc<dyn Clock>,
    pub config: BusConfig,
}

pub fn router(state: Arc<BusState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

async fn ws_handler(State(state): State<Arc<BusState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, socket))
}

/// Recovers the bus connection id a PTY event was addressed to, from the
/// `"{conn_id}:{session_id}"` token `crate::connection::encode_pty_connection`
/// produced.
pub fn decode_pty_connection(id: &PtyConnectionId) -> Option<ConnId> {
    id.0.split_once(':').and_then(|(conn, _)| conn.parse::<ConnId>().ok())
}

async fn handle_connection(state: Arc<BusState>, socket: WebSocket) {
    let (conn_id, mut from_hub) = state.hub.register().await;
    let mut ctx = ConnectionContext::new(state.config.rate_limit_count, state.config.rate_limit_window);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut ping_interval = tokio::time::interval(state.config.ping_interval);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            outbound = from_hub.recv() => {
                match outbound {
                    Some(msg) => {
                        if send_json(&mut ws_tx, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                if ctx.last_pong.elapsed() > state.config.connection_timeout {
                    tracing::debug!(conn_id, "closing connection: no pong within timeout");
                    break;
                }
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > state.config.max_frame_bytes {
                            let err = ServerMessage::error(ErrorCode::ParseError, "message exceeds size limit");
                            if send_json(&mut ws_tx, &err).await.is_err() {
                                break;
                            }
                            continue;
                        }
                        if !ctx.limiter.allow() {
                            let err = ServerMessage::error(ErrorCode::RateLimited, "too many messages");
                            if send_json(&mut ws_tx, &err).await.is_err() {
                                break;
                            }
                            continue;
                        }
                        if let Some(reply) = handle_text(&state, conn_id, &mut ctx, &text).await {
                            if send_json(&mut ws_tx, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        ctx.last_pong = std::time::Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    cleanup_pty_attachments(&state, conn_id, &ctx).await;
    state.hub.unregister(conn_id).await;
}

async fn cleanup_pty_attachments(state: &BusState, conn_id: ConnId, ctx: &ConnectionContext) {
    for session_id in ctx.attached_sessions() {
        let pty_conn_id = encode_pty_connection(conn_id, session_id);
        let _ = state.pty.detach(&pty_conn_id).await;
    }
}

async fn handle_text(
    state: &BusState,
    conn_id: ConnId,
    ctx: &mut ConnectionContext,
    text: &str,
) -> Option<ServerMessage> {
    let parsed = parse_client_message(text);
    let msg = match parsed {
        Ok(m) => m,
        Err(code) => return Some(ServerMessage::error(code, "could not process message")),
    };

    match msg {
        ClientMessage::Ping => Some(ServerMessage::Pong { payload: PongPayload { timestamp: state.clock.now_ms() } }),

        ClientMessage::SessionSubscribe { payload } => match state.hub.subscribe(conn_id, payload.session_id).await {
            Ok(()) => {
                let buffer_lines = state
                    .supervisor
                    .get_session_output(payload.session_id, state.config.replay_lines)
                    .await
                    .unwrap_or_default();
                Some(ServerMessage::Subscribed {
                    payload: SubscribedPayload { session_id: payload.session_id, buffer_lines },
                })
            }
            Err(e) => Some(map_error(&e)),
        },

        ClientMessage::SessionUnsubscribe { payload } => {
            state.hub.unsubscribe(conn_id, payload.session_id).await;
            Some(ServerMessage::Unsubscribed { payload })
        }

        ClientMessage::SessionInput { payload } => handle_session_input(state, conn_id, payload).await,

        ClientMessage::PtyAttach { payload } => handle_pty_attach(state, conn_id, ctx, payload).await,

        ClientMessage::PtyDetach { payload } => {
            let pty_conn_id = encode_pty_connection(conn_id, payload.session_id);
            match state.pty.detach(&pty_conn_id).await {
                Ok(()) => {
                    ctx.note_detach(payload.session_id);
                    None
                }
                Err(e) => Some(map_pty_error(&e)),
            }
        }

        ClientMessage::PtyWrite { payload } => handle_pty_write(state, conn_id, payload).await,

        ClientMessage::PtyResize { payload } => handle_pty_resize(state, conn_id, ctx, payload).await,

        ClientMessage::PtySelectPane { payload } => handle_pty_select_pane(state, conn_id, ctx, payload).await,
    }
}

async fn handle_session_input(state: &BusState, conn_id: ConnId, payload: SessionInputPayload) -> Option<ServerMessage> {
    if !state.hub.is_subscribed(conn_id, payload.session_id).await {
        return Some(ServerMessage::error(ErrorCode::NotSubscribed, "subscribe before sending input"));
    }
    if payload.text.chars().count() > MAX_SESSION_INPUT_CHARS {
        return Some(ServerMessage::error(ErrorCode::InvalidMessage, "text exceeds 10000 characters"));
    }
    match state.supervisor.send_input(payload.session_id, &payload.text).await {
        Ok(()) => None,
        Err(e) => Some(map_error(&e)),
    }
}

async fn handle_pty_attach(
    state: &BusState,
    conn_id: ConnId,
    ctx: &mut ConnectionContext,
    payload: PtyAttachPayload,
) -> Option<ServerMessage> {
    let session = match state.supervisor.get_active_session(payload.session_id).await {
        Ok(s) => s,
        Err(e) => return Some(map_error(&e)),
    };
    let Some(pane_raw) = session.pane_id else {
        return Some(ServerMessage::error(ErrorCode::PtyAttachFailed, "session has no pane"));
    };
    let pane_id = match PaneId::parse(pane_raw) {
        Ok(p) => p,
        Err(e) => return Some(map_pty_error(&e)),
    };

    let pty_conn_id = encode_pty_connection(conn_id, payload.session_id);
    match state.pty.attach(pty_conn_id, payload.session_id, &pane_id, payload.cols, payload.rows).await {
        Ok(()) => {
            ctx.note_attach(payload.session_id, payload.cols, payload.rows);
            Some(ServerMessage::PtyAttached { payload: SessionIdPayload { session_id: payload.session_id } })
        }
        Err(e) => Some(map_pty_error(&e)),
    }
}

async fn handle_pty_write(state: &BusState, conn_id: ConnId, payload: PtyWritePayload) -> Option<ServerMessage> {
    let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(&payload.data) else {
        return Some(ServerMessage::error(ErrorCode::InvalidMessage, "pty:write data must be base64"));
    };
    let pty_conn_id = encode_pty_connection(conn_id, payload.session_id);
    match state.pty.write(&pty_conn_id, Bytes::from(bytes)).await {
        Ok(()) => None,
        Err(e) => Some(map_pty_error(&e)),
    }
}

async fn handle_pty_resize(
    state: &BusState,
    conn_id: ConnId,
    ctx: &mut ConnectionContext,
    payload: PtyResizePayload,
) -> Option<ServerMessage> {
    let pty_conn_id = encode_pty_connection(conn_id, payload.session_id);
    match state.pty.resize(&pty_conn_id, payload.cols, payload.rows).await {
        Ok(()) => {
            ctx.note_attach(payload.session_id, payload.cols, payload.rows);
            None
        }
        Err(e) => Some(map_pty_error(&e)),
    }
}

async fn handle_pty_select_pane(
    state: &BusState,
    conn_id: ConnId,
    ctx: &mut ConnectionContext,
    payload: SessionIdPayload,
) -> Option<ServerMessage> {
    if !ctx.is_attached(payload.session_id) {
        return Some(ServerMessage::error(ErrorCode::PtyAttachFailed, "no existing pty attachment to select a pane for"));
    }
    let (cols, rows) = ctx.last_dims(payload.session_id).unwrap_or((80, 24));

    let old_conn_id = encode_pty_connection(conn_id, payload.session_id);
    let _ = state.pty.detach(&old_conn_id).await;
    ctx.note_detach(payload.session_id);

    handle_pty_attach(state, conn_id, ctx, PtyAttachPayload { session_id: payload.session_id, cols, rows }).await
}

fn parse_client_message(text: &str) -> Result<ClientMessage, ErrorCode> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|_| ErrorCode::ParseError)?;
    serde_json::from_value(value).map_err(|_| ErrorCode::InvalidMessage)
}

fn map_error(e: &Error) -> ServerMessage {
    let code = match e.kind {
        ErrorKind::NotFound => ErrorCode::SessionNotFound,
        _ => ErrorCode::Internal,
    };
    ServerMessage::error(code, e.message.clone())
}

fn map_pty_error(e: &Error) -> ServerMessage {
    ServerMessage::error(ErrorCode::PtyAttachFailed, e.message.clone())
}

async fn send_json<S>(tx: &mut S, msg: &ServerMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(msg).map_err(|_| ())?;
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}
