// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use sessions_core::error::{Error, ErrorKind, Result};
use sessions_core::ids::ProjectId;
use sessions_core::model::Project;
use sessions_core::pane::PaneId;
use sessions_core::time::FakeClock;
use sessions_multiplex::{CaptureOptions, MultiplexerAdapter, PaneDimensions, PaneInfo, PaneSpec};
use sessions_repository::{InMemoryRepository, ProjectsRepository, SessionsRepository};

use crate::supervisor::{StartSessionRequest, Supervisor};
use crate::SupervisorEvent;

#[derive(Default)]
struct FakePaneState {
    alive: bool,
    capture: String,
}

/// In-process fake standing in for a real tmux server: panes are just
/// entries in a map instead of OS processes.
struct FakeMultiplexer {
    panes: Mutex<HashMap<String, FakePaneState>>,
    next_pane: Mutex<u32>,
}

impl FakeMultiplexer {
    fn new() -> Self {
        Self { panes: Mutex::new(HashMap::new()), next_pane: Mutex::new(1) }
    }

    async fn set_capture(&self, pane_id: &str, capture: &str) {
        let mut panes = self.panes.lock().await;
        if let Some(state) = panes.get_mut(pane_id) {
            state.capture = capture.to_string();
        }
    }

    async fn kill(&self, pane_id: &str) {
        let mut panes = self.panes.lock().await;
        if let Some(state) = panes.get_mut(pane_id) {
            state.alive = false;
        }
    }
}

#[async_trait]
impl MultiplexerAdapter for FakeMultiplexer {
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
        let mut next = self.next_pane.lock().await;
        let id = format!("%{next}");
        *next += 1;
        self.panes.lock().await.insert(id.clone(), FakePaneState { alive: true, capture: String::new() });
        PaneId::parse(id)
    }

    async fn kill_pane(&self, pane_id: &PaneId) -> Result<()> {
        self.kill(pane_id.as_str()).await;
        Ok(())
    }

    async fn is_pane_alive(&self, pane_id: &PaneId) -> Result<bool> {
        Ok(self.panes.lock().await.get(pane_id.as_str()).map(|s| s.alive).unwrap_or(false))
    }

    async fn get_pane(&self, pane_id: &PaneId) -> Result<PaneInfo> {
        if self.is_pane_alive(pane_id).await? {
            Ok(PaneInfo { session: "demo".into(), window: "main".into(), index: 0, pid: Some(1), active: true, title: String::new() })
        } else {
            Err(Error::not_found("pane not found"))
        }
    }

    async fn capture_pane(&self, pane_id: &PaneId, _opts: CaptureOptions) -> Result<String> {
        Ok(self.panes.lock().await.get(pane_id.as_str()).map(|s| s.capture.clone()).unwrap_or_default())
    }

    async fn send_keys(&self, _pane_id: &PaneId, _keys: &str, _literal: bool) -> Result<()> {
        Ok(())
    }
    async fn send_raw_keys(&self, _pane_id: &PaneId, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }
    async fn send_text(&self, _pane_id: &PaneId, _text: &str) -> Result<()> {
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

async fn make_project(repo: &InMemoryRepository) -> Project {
    let project = Project {
        id: ProjectId::new(),
        display_name: "demo".into(),
        repo_path: "/repos/demo".into(),
        multiplexer_session_name: "demo".into(),
        multiplexer_window_name: None,
        ticket_corpus_path: "tickets".into(),
        handoff_path: ".handoff.json".into(),
        created_at: 0,
        updated_at: 0,
    };
    repo.create_project(project.clone()).await.expect("create project");
    project
}

fn make_supervisor(repo: Arc<InMemoryRepository>, mux: Arc<FakeMultiplexer>) -> Arc<Supervisor> {
    Arc::new(
        Supervisor::new(repo, mux, Arc::new(FakeClock::new(0)))
            .with_poll_interval(std::time::Duration::from_millis(10)),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn start_session_transitions_to_running_after_first_poll() {
    let repo = Arc::new(InMemoryRepository::new());
    let mux = Arc::new(FakeMultiplexer::new());
    let project = make_project(&repo).await;
    let supervisor = make_supervisor(repo.clone(), mux.clone());

    let session = supervisor
        .start_session(StartSessionRequest { project_id: project.id, ..Default::default() })
        .await
        .expect("start session");

    let mut events = supervisor.subscribe();
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        loop {
            if let Ok(SupervisorEvent::Status { new, .. }) = events.recv().await {
                if matches!(new, sessions_core::model::SessionStatus::Running) {
                    break;
                }
            }
        }
    })
    .await
    .expect("saw running transition");

    let updated = repo.get_session(session.id).await.expect("find session");
    assert!(matches!(updated.status, sessions_core::model::SessionStatus::Running));
}

#[tokio::test(flavor = "multi_thread")]
async fn pane_death_marks_session_completed_and_emits_exit() {
    let repo = Arc::new(InMemoryRepository::new());
    let mux = Arc::new(FakeMultiplexer::new());
    let project = make_project(&repo).await;
    let supervisor = make_supervisor(repo.clone(), mux.clone());

    let session = supervisor
        .start_session(StartSessionRequest { project_id: project.id, ..Default::default() })
        .await
        .expect("start session");

    let pane_id = session.pane_id.clone().expect("pane id set");
    mux.kill(&pane_id).await;

    let mut events = supervisor.subscribe();
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        loop {
            if let Ok(SupervisorEvent::Exit { session_id, .. }) = events.recv().await {
                if session_id == session.id {
                    break;
                }
            }
        }
    })
    .await
    .expect("saw exit event");

    let updated = repo.get_session(session.id).await.expect("find session");
    assert!(matches!(updated.status, sessions_core::model::SessionStatus::Completed));
}

#[tokio::test]
async fn one_running_session_per_ticket_invariant_is_enforced() {
    let repo = Arc::new(InMemoryRepository::new());
    let mux = Arc::new(FakeMultiplexer::new());
    let project = make_project(&repo).await;
    let supervisor = make_supervisor(repo.clone(), mux.clone());
    let ticket_id = sessions_core::ids::TicketId::new();

    supervisor
        .start_ticket_session(project.id, ticket_id, None, None, vec![])
        .await
        .expect("first session starts");

    let err = supervisor
        .start_ticket_session(project.id, ticket_id, None, None, vec![])
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[tokio::test]
async fn output_diffing_appends_only_new_lines_to_ring() {
    let repo = Arc::new(InMemoryRepository::new());
    let mux = Arc::new(FakeMultiplexer::new());
    let project = make_project(&repo).await;
    let supervisor = make_supervisor(repo.clone(), mux.clone());

    let session = supervisor
        .start_session(StartSessionRequest { project_id: project.id, ..Default::default() })
        .await
        .expect("start session");
    let pane_id = session.pane_id.clone().expect("pane id set");

    mux.set_capture(&pane_id, "line1\nline2\n").await;
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    mux.set_capture(&pane_id, "line1\nline2\nline3\n").await;
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;

    let output = supervisor.get_session_output(session.id, 10).await.expect("get output");
    assert!(output.contains(&"line3".to_string()));
}
