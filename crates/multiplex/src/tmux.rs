// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tmux`-backed [`MultiplexerAdapter`], grounded on the compatibility
//! `TmuxBackend`: build a `tokio::process::Command`, optionally prefixed
//! with `-S <socket>` to address an isolated server, and shell out.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use sessions_core::error::{Error, Result};
use sessions_core::pane::PaneId;

use crate::adapter::{CaptureOptions, MultiplexerAdapter, PaneDimensions, PaneInfo, PaneSpec};
use crate::shell_quote::join_argv;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TmuxAdapter {
    socket: Option<PathBuf>,
}

impl TmuxAdapter {
    pub fn new() -> Self {
        Self { socket: None }
    }

    pub fn with_socket(socket: PathBuf) -> Self {
        Self { socket: Some(socket) }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("tmux");
        if let Some(ref s) = self.socket {
            cmd.arg("-S").arg(s);
        }
        cmd
    }

    /// Runs a tmux subcommand with the hard 30 s timeout and maps failures
    /// to the NotFound/External split named in §4.1.
    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        let mut cmd = self.command();
        cmd.args(args);
        let output = timeout(COMMAND_TIMEOUT, cmd.output()).await.map_err(|_| {
            Error::timeout(format!("tmux {} timed out after {:?}", args.join(" "), COMMAND_TIMEOUT))
        })?;

        match output {
            Ok(out) if out.status.success() => Ok(out),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
                Err(classify_failure(&stderr))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::external("tmux is not installed or not in PATH"))
            }
            Err(e) => Err(Error::external(format!("failed to invoke tmux: {e}"))),
        }
    }
}

impl Default for TmuxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// tmux reports missing entities as distinct, greppable stderr strings;
/// anything else is a generic command failure (§4.1: "no server" is
/// distinguished from missing-entity errors).
fn classify_failure(stderr: &str) -> Error {
    if stderr.contains("no server running") || stderr.contains("error connecting to") {
        Error::external(format!("tmux server unavailable: {}", stderr.trim()))
    } else if stderr.contains("can't find session")
        || stderr.contains("session not found")
        || stderr.contains("unknown session")
    {
        Error::not_found(format!("tmux session not found: {}", stderr.trim()))
    } else if stderr.contains("can't find window") {
        Error::not_found(format!("tmux window not found: {}", stderr.trim()))
    } else if stderr.contains("can't find pane") {
        Error::not_found(format!("tmux pane not found: {}", stderr.trim()))
    } else {
        Error::external(format!("tmux command failed: {}", stderr.trim()))
    }
}

fn parse_pane_info_line(line: &str) -> Option<PaneInfo> {
    // "#{session_name}\t#{window_name}\t#{window_index}\t#{pane_pid}\t#{pane_active}\t#{pane_title}"
    let mut fields = line.splitn(6, '\t');
    let session = fields.next()?.to_string();
    let window = fields.next()?.to_string();
    let index: u32 = fields.next()?.parse().ok()?;
    let pid: Option<u32> = fields.next()?.parse().ok();
    let active = fields.next()? == "1";
    let title = fields.next().unwrap_or_default().to_string();
    Some(PaneInfo { session, window, index, pid, active, title })
}

const PANE_FORMAT: &str =
    "#{session_name}\t#{window_name}\t#{window_index}\t#{pane_pid}\t#{pane_active}\t#{pane_title}";

#[async_trait]
impl MultiplexerAdapter for TmuxAdapter {
    async fn list_sessions(&self) -> Result<Vec<String>> {
        let out = self.run(&["list-sessions", "-F", "#{session_name}"]).await?;
        Ok(String::from_utf8_lossy(&out.stdout).lines().map(String::from).collect())
    }

    async fn session_exists(&self, session: &str) -> Result<bool> {
        match self.run(&["has-session", "-t", session]).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind == sessions_core::error::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_windows(&self, session: &str) -> Result<Vec<String>> {
        let out = self.run(&["list-windows", "-t", session, "-F", "#{window_name}"]).await?;
        Ok(String::from_utf8_lossy(&out.stdout).lines().map(String::from).collect())
    }

    async fn list_panes(&self, target: &str) -> Result<Vec<PaneInfo>> {
        let out = self.run(&["list-panes", "-t", target, "-F", PANE_FORMAT]).await?;
        Ok(String::from_utf8_lossy(&out.stdout).lines().filter_map(parse_pane_info_line).collect())
    }

    async fn create_pane(&self, session: &str, spec: PaneSpec) -> Result<PaneId> {
        let target = match &spec.window {
            Some(window) => format!("{session}:{window}"),
            None => session.to_string(),
        };
        let mut args: Vec<String> = vec!["split-window".into(), "-t".into(), target, "-P".into(), "-F".into(), "#{pane_id}".into()];
        if matches!(spec.split_axis, Some(crate::adapter::SplitAxis::Horizontal)) {
            args.push("-h".into());
        }
        if let Some(cwd) = &spec.cwd {
            args.push("-c".into());
            args.push(cwd.clone());
        }
        if let Some(argv) = &spec.initial_command {
            args.push(join_argv(argv));
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.run(&arg_refs).await?;
        let raw = String::from_utf8_lossy(&out.stdout).trim().to_string();
        PaneId::parse(raw)
    }

    async fn kill_pane(&self, pane_id: &PaneId) -> Result<()> {
        self.run(&["kill-pane", "-t", pane_id.as_str()]).await.map(|_| ())
    }

    async fn is_pane_alive(&self, pane_id: &PaneId) -> Result<bool> {
        match self.get_pane(pane_id).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind == sessions_core::error::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_pane(&self, pane_id: &PaneId) -> Result<PaneInfo> {
        let out = self.run(&["list-panes", "-t", pane_id.as_str(), "-F", PANE_FORMAT]).await?;
        String::from_utf8_lossy(&out.stdout)
            .lines()
            .next()
            .and_then(parse_pane_info_line)
            .ok_or_else(|| Error::not_found(format!("pane {pane_id} not found")))
    }

    async fn capture_pane(&self, pane_id: &PaneId, opts: CaptureOptions) -> Result<String> {
        let mut args: Vec<String> = vec!["capture-pane".into(), "-p".into(), "-t".into(), pane_id.to_string()];
        if !opts.strip_control_sequences {
            args.push("-e".into());
        }
        if let Some(start) = opts.start_line {
            args.push("-S".into());
            args.push(start.to_string());
        } else if let Some(lines) = opts.lines {
            args.push("-S".into());
            args.push(format!("-{lines}"));
        }
        if let Some(end) = opts.end_line {
            args.push("-E".into());
            args.push(end.to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.run(&arg_refs).await?;
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    async fn send_keys(&self, pane_id: &PaneId, keys: &str, literal: bool) -> Result<()> {
        let pane = pane_id.to_string();
        let mut args = vec!["send-keys", "-t", &pane];
        if literal {
            args.push("-l");
        }
        args.push(keys);
        self.run(&args).await.map(|_| ())
    }

    async fn send_raw_keys(&self, pane_id: &PaneId, bytes: &[u8]) -> Result<()> {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        let pane = pane_id.to_string();
        self.run(&["send-keys", "-H", "-t", &pane, &hex]).await.map(|_| ())
    }

    async fn send_text(&self, pane_id: &PaneId, text: &str) -> Result<()> {
        self.send_keys(pane_id, text, true).await?;
        self.send_keys(pane_id, "Enter", false).await
    }

    async fn send_interrupt(&self, pane_id: &PaneId) -> Result<()> {
        self.send_keys(pane_id, "C-c", false).await
    }

    async fn send_eof(&self, pane_id: &PaneId) -> Result<()> {
        self.send_keys(pane_id, "C-d", false).await
    }

    async fn send_suspend(&self, pane_id: &PaneId) -> Result<()> {
        self.send_keys(pane_id, "C-z", false).await
    }

    async fn get_pane_dimensions(&self, pane_id: &PaneId) -> Result<PaneDimensions> {
        let out = self
            .run(&["display-message", "-p", "-t", pane_id.as_str(), "#{pane_width}x#{pane_height}"])
            .await?;
        let text = String::from_utf8_lossy(&out.stdout);
        let (cols, rows) = text
            .trim()
            .split_once('x')
            .ok_or_else(|| Error::external("malformed pane dimensions from tmux"))?;
        let cols: u16 = cols.parse().map_err(|_| Error::external("malformed pane width"))?;
        let rows: u16 = rows.parse().map_err(|_| Error::external("malformed pane height"))?;
        Ok(PaneDimensions { cols, rows })
    }

    async fn set_pane_title(&self, pane_id: &PaneId, title: &str) -> Result<()> {
        let pane = pane_id.to_string();
        self.run(&["select-pane", "-t", &pane, "-T", title]).await.map(|_| ())
    }
}
