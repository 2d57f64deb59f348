// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the end-to-end scenario tests in `tests/`: a
//! scripted Multiplexer Adapter double and project/ticket seeding, so each
//! scenario test builds a real `sessions_engine::Engine` instead of poking
//! at one component in isolation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use sessions_core::error::Result;
use sessions_core::ids::ProjectId;
use sessions_core::model::{Project, Ticket, TicketState};
use sessions_core::pane::PaneId;
use sessions_multiplex::{CaptureOptions, MultiplexerAdapter, PaneDimensions, PaneInfo, PaneSpec};
use sessions_repository::{InMemoryRepository, ProjectsRepository, TicketsRepository};

/// A fake multiplexer whose panes' scrollback is driven explicitly by the
/// test via [`ScriptedMultiplexer::append_capture`], and whose liveness can
/// be flipped off to simulate an externally killed pane.
pub struct ScriptedMultiplexer {
    alive: AtomicBool,
    next_pane: AtomicU32,
    screens: Mutex<HashMap<String, String>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl ScriptedMultiplexer {
    pub fn new() -> Self {
        Self { alive: AtomicBool::new(true), next_pane: AtomicU32::new(1), screens: Mutex::new(HashMap::new()), sent: Mutex::new(Vec::new()) }
    }

    /// Appends a line to `pane`'s scrollback; the next `capture_pane` call
    /// observes it.
    pub async fn append_capture(&self, pane: &str, line: &str) {
        let mut screens = self.screens.lock().await;
        let screen = screens.entry(pane.to_string()).or_default();
        if !screen.is_empty() {
            screen.push('\n');
        }
        screen.push_str(line);
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub async fn sent_texts(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

impl Default for ScriptedMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MultiplexerAdapter for ScriptedMultiplexer {
    async fn list_sessions(&self) -> Result<Vec<String>> {
        Ok(vec![])
    }
    async fn session_exists(&self, _session: &str) -> Result<bool> {
        Ok(true)
    }
    async fn list_windows(&self, _session: &str) -> Result<Vec<String>> {
        Ok(vec![])
    }
    async fn list_panes(&self, _target: &str) -> Result<Vec<PaneInfo>> {
        Ok(vec![])
    }
    async fn create_pane(&self, _session: &str, _spec: PaneSpec) -> Result<PaneId> {
        let n = self.next_pane.fetch_add(1, Ordering::SeqCst);
        PaneId::parse(format!("%{n}"))
    }
    async fn kill_pane(&self, _pane_id: &PaneId) -> Result<()> {
        Ok(())
    }
    async fn is_pane_alive(&self, _pane_id: &PaneId) -> Result<bool> {
        Ok(self.alive.load(Ordering::SeqCst))
    }
    async fn get_pane(&self, _pane_id: &PaneId) -> Result<PaneInfo> {
        Ok(PaneInfo { session: "demo".into(), window: "main".into(), index: 0, pid: Some(1), active: true, title: String::new() })
    }
    async fn capture_pane(&self, pane_id: &PaneId, _opts: CaptureOptions) -> Result<String> {
        Ok(self.screens.lock().await.get(pane_id.as_str()).cloned().unwrap_or_default())
    }
    async fn send_keys(&self, _pane_id: &PaneId, _keys: &str, _literal: bool) -> Result<()> {
        Ok(())
    }
    async fn send_raw_keys(&self, _pane_id: &PaneId, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }
    async fn send_text(&self, pane_id: &PaneId, text: &str) -> Result<()> {
        self.sent.lock().await.push((pane_id.as_str().to_string(), text.to_string()));
        Ok(())
    }
    async fn send_interrupt(&self, _pane_id: &PaneId) -> Result<()> {
        Ok(())
    }
    async fn send_eof(&self, _pane_id: &PaneId) -> Result<()> {
        Ok(())
    }
    async fn send_suspend(&self, _pane_id: &PaneId) -> Result<()> {
        Ok(())
    }
    async fn get_pane_dimensions(&self, _pane_id: &PaneId) -> Result<PaneDimensions> {
        Ok(PaneDimensions { cols: 80, rows: 24 })
    }
    async fn set_pane_title(&self, _pane_id: &PaneId, _title: &str) -> Result<()> {
        Ok(())
    }
}

/// Creates a Project rooted at `repo_path` (a tempdir in every test, so the
/// handoff file and telemetry files don't collide across test processes)
/// and a Backlog ticket under it.
pub async fn seed_project_and_ticket(repo: &InMemoryRepository, repo_path: &str) -> (Project, Ticket) {
    let project = Project {
        id: ProjectId::new(),
        display_name: "demo".into(),
        repo_path: repo_path.into(),
        multiplexer_session_name: "demo".into(),
        multiplexer_window_name: None,
        ticket_corpus_path: "tickets".into(),
        handoff_path: ".handoff.json".into(),
        created_at: 0,
        updated_at: 0,
    };
    repo.create_project(project.clone()).await.expect("create project");

    let ticket = Ticket {
        id: sessions_core::ids::TicketId::new(),
        project_id: project.id,
        external_id: Some("ABC-1".into()),
        title: "fix the parser".into(),
        state: TicketState::Backlog,
        file_path: "tickets/abc-1.md".into(),
        is_adhoc: false,
        is_explore: false,
        started_at: None,
        completed_at: None,
        rejection_feedback: None,
        created_at: 0,
        updated_at: 0,
    };
    repo.create_ticket(ticket.clone()).await.expect("create ticket");
    (project, ticket)
}

/// Builds an `Engine` over an in-memory repository and a fresh
/// `ScriptedMultiplexer`, with the telemetry directory and (via
/// `repo_path`) the handoff file both rooted under `dir`.
pub fn build_engine(
    repo: Arc<InMemoryRepository>,
    multiplexer: Arc<ScriptedMultiplexer>,
    dir: &std::path::Path,
) -> Arc<sessions_engine::Engine> {
    let clock: Arc<dyn sessions_core::time::Clock> = Arc::new(sessions_core::time::SystemClock);
    let mut config = sessions_engine::EngineConfig::default();
    config.telemetry_dir = dir.join("telemetry");
    sessions_engine::assemble(repo, multiplexer, clock, config)
}
