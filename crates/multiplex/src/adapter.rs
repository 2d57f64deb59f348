// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multiplexer Adapter contract (§4.1). One concrete implementation
//! ([`crate::tmux::TmuxAdapter`]) wraps the `tmux` binary; tests program
//! against this trait with a fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sessions_core::error::Result;
use sessions_core::pane::PaneId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitAxis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Default)]
pub struct PaneSpec {
    pub window: Option<String>,
    pub split_axis: Option<SplitAxis>,
    pub cwd: Option<String>,
    /// argv form; the adapter is responsible for shell-quoting each part
    /// before handing tmux a single command line (§4.1, §8).
    pub initial_command: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub session: String,
    pub window: String,
    pub index: u32,
    pub pid: Option<u32>,
    pub active: bool,
    pub title: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureOptions {
    pub lines: Option<u32>,
    pub strip_control_sequences: bool,
    pub start_line: Option<i32>,
    pub end_line: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneDimensions {
    pub cols: u16,
    pub rows: u16,
}

/// Terminal multiplexer operations (§4.1). Every method may fail with
/// `External` (multiplexer unavailable / command failed) or `NotFound`
/// (session/window/pane).
#[async_trait]
pub trait MultiplexerAdapter: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<String>>;
    async fn session_exists(&self, session: &str) -> Result<bool>;
    async fn list_windows(&self, session: &str) -> Result<Vec<String>>;
    async fn list_panes(&self, target: &str) -> Result<Vec<PaneInfo>>;

    async fn create_pane(&self, session: &str, spec: PaneSpec) -> Result<PaneId>;
    async fn kill_pane(&self, pane_id: &PaneId) -> Result<()>;
    async fn is_pane_alive(&self, pane_id: &PaneId) -> Result<bool>;
    async fn get_pane(&self, pane_id: &PaneId) -> Result<PaneInfo>;

    async fn capture_pane(&self, pane_id: &PaneId, opts: CaptureOptions) -> Result<String>;

    async fn send_keys(&self, pane_id: &PaneId, keys: &str, literal: bool) -> Result<()>;
    /// Hex-encoded, chunked into two-character units, so control bytes and
    /// multi-byte sequences pass through unmolested (§4.1).
    async fn send_raw_keys(&self, pane_id: &PaneId, bytes: &[u8]) -> Result<()>;
    async fn send_text(&self, pane_id: &PaneId, text: &str) -> Result<()>;

    async fn send_interrupt(&self, pane_id: &PaneId) -> Result<()>;
    async fn send_eof(&self, pane_id: &PaneId) -> Result<()>;
    async fn send_suspend(&self, pane_id: &PaneId) -> Result<()>;

    async fn get_pane_dimensions(&self, pane_id: &PaneId) -> Result<PaneDimensions>;
    async fn set_pane_title(&self, pane_id: &PaneId, title: &str) -> Result<()>;
}
