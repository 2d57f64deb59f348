// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY Attachment manager (§4.2): tracks one [`crate::spawn::AttachedPty`]
//! per connection, probes platform PTY availability once, and forwards
//! pty:data/pty:exit events to a shared channel so the Fan-out Bus mediates
//! delivery instead of holding direct references (§9 "the bus is the
//! mediator").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use sessions_core::error::{Error, Result};
use sessions_core::ids::SessionId;
use sessions_core::pane::PaneId;
use sessions_multiplex::MultiplexerAdapter;

use crate::spawn::AttachedPty;

/// §5 "Timeouts: ... PTY attach: 10s" — covers the liveness check, dimension
/// probe, and spawn together.
const ATTACH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

#[derive(Debug, Clone)]
pub enum PtyEvent {
    Data { connection_id: ConnectionId, session_id: SessionId, bytes: Bytes },
    Exit { connection_id: ConnectionId, session_id: SessionId, exit_code: Option<i32>, signal: Option<i32> },
}

struct Attached {
    input_tx: mpsc::Sender<Bytes>,
    resize_tx: mpsc::Sender<(u16, u16)>,
}

/// Production-facing handle for driving an attached PTY.
pub struct PtyAttachment {
    multiplexer: Arc<dyn MultiplexerAdapter>,
    events: mpsc::UnboundedSender<PtyEvent>,
    connections: Mutex<HashMap<ConnectionId, Attached>>,
    pty_available: AtomicBool,
    pty_probed: AtomicBool,
}

impl PtyAttachment {
    pub fn new(multiplexer: Arc<dyn MultiplexerAdapter>, events: mpsc::UnboundedSender<PtyEvent>) -> Self {
        Self {
            multiplexer,
            events,
            connections: Mutex::new(HashMap::new()),
            pty_available: AtomicBool::new(true),
            pty_probed: AtomicBool::new(false),
        }
    }

    /// True once a PTY has failed to spawn on this host; probed once (§4.2).
    pub fn is_available(&self) -> bool {
        !self.pty_probed.load(Ordering::SeqCst) || self.pty_available.load(Ordering::SeqCst)
    }

    pub async fn attach(
        &self,
        connection_id: ConnectionId,
        session_id: SessionId,
        pane_id: &PaneId,
        cols: u16,
        rows: u16,
    ) -> Result<()> {
        if self.connections.lock().await.contains_key(&connection_id) {
            return Err(Error::conflict(format!("connection {connection_id:?} is already attached")));
        }

        let attached = timeout(ATTACH_TIMEOUT, async {
            if !self.multiplexer.is_pane_alive(pane_id).await? {
                return Err(Error::validation(format!("pane {pane_id} is not alive")));
            }

            let dims = self.multiplexer.get_pane_dimensions(pane_id).await.unwrap_or(
                sessions_multiplex::PaneDimensions { cols, rows },
            );

            let argv = vec!["tmux".to_string(), "attach-session".to_string(), "-t".to_string(), pane_id.to_string()];
            match AttachedPty::spawn(&argv, dims.cols, dims.rows) {
                Ok(pty) => {
                    self.pty_probed.store(true, Ordering::SeqCst);
                    self.pty_available.store(true, Ordering::SeqCst);
                    Ok(pty)
                }
                Err(e) => {
                    self.pty_probed.store(true, Ordering::SeqCst);
                    self.pty_available.store(false, Ordering::SeqCst);
                    Err(Error::external(format!("pty unavailable: {e}")))
                }
            }
        })
        .await
        .map_err(|_| Error::timeout(format!("pty attach for pane {pane_id} timed out after {ATTACH_TIMEOUT:?}")))??;

        let (input_tx, input_rx) = mpsc::channel::<Bytes>(64);
        let (resize_tx, resize_rx) = mpsc::channel::<(u16, u16)>(8);
        let (output_tx, mut output_rx) = mpsc::channel::<Bytes>(64);

        self.connections
            .lock()
            .await
            .insert(connection_id.clone(), Attached { input_tx, resize_tx });

        let events = self.events.clone();
        let conn_for_pump = connection_id.clone();
        tokio::spawn(async move {
            while let Some(bytes) = output_rx.recv().await {
                let _ = events.send(PtyEvent::Data {
                    connection_id: conn_for_pump.clone(),
                    session_id,
                    bytes,
                });
            }
        });

        let events = self.events.clone();
        tokio::spawn(async move {
            let status = attached.run(output_tx, input_rx, resize_rx).await;
            let (exit_code, signal) = match status {
                Ok(s) => (s.code, s.signal),
                Err(_) => (None, None),
            };
            let _ = events.send(PtyEvent::Exit { connection_id, session_id, exit_code, signal });
        });

        Ok(())
    }

    pub async fn write(&self, connection_id: &ConnectionId, bytes: Bytes) -> Result<()> {
        let connections = self.connections.lock().await;
        let attached = connections
            .get(connection_id)
            .ok_or_else(|| Error::not_found(format!("no pty attached for connection {connection_id:?}")))?;
        attached
            .input_tx
            .send(bytes)
            .await
            .map_err(|_| Error::external("pty input channel closed"))
    }

    pub async fn resize(&self, connection_id: &ConnectionId, cols: u16, rows: u16) -> Result<()> {
        let connections = self.connections.lock().await;
        let attached = connections
            .get(connection_id)
            .ok_or_else(|| Error::not_found(format!("no pty attached for connection {connection_id:?}")))?;
        attached
            .resize_tx
            .send((cols, rows))
            .await
            .map_err(|_| Error::external("pty resize channel closed"))
    }

    pub async fn detach(&self, connection_id: &ConnectionId) -> Result<()> {
        self.connections
            .lock()
            .await
            .remove(connection_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("no pty attached for connection {connection_id:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_equality_is_value_based() {
        assert_eq!(ConnectionId("c1".into()), ConnectionId("c1".into()));
        assert_ne!(ConnectionId("c1".into()), ConnectionId("c2".into()));
    }
}
