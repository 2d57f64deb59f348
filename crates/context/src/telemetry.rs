// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session telemetry file tailer, adapted from the driver's log
//! tailer: lazy open, tracked byte offset, truncation-reset, notify
//! wake combined with a short poll fallback.

use std::path::PathBuf;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sessions_core::error::Result;

/// Poll fallback interval when no filesystem notification arrives (§6:
/// "debounced reads on file-change notifications with <=1s poll fallback").
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

pub struct TelemetryTailer {
    path: PathBuf,
    offset: u64,
    poll_interval: Duration,
}

impl TelemetryTailer {
    pub fn new(path: PathBuf) -> Self {
        Self { path, offset: 0, poll_interval: DEFAULT_POLL_INTERVAL }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads any complete lines appended since the last call. Returns an
    /// empty vec (not an error) if the file doesn't exist yet.
    pub async fn read_new_lines(&mut self) -> Result<Vec<String>> {
        let file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(sessions_core::error::Error::transient_io(err.to_string())),
        };

        let meta = file.metadata().await.map_err(|err| sessions_core::error::Error::transient_io(err.to_string()))?;
        if meta.len() < self.offset {
            self.offset = 0;
        }

        let mut reader = BufReader::new(file);
        reader
            .seek(std::io::SeekFrom::Start(self.offset))
            .await
            .map_err(|err| sessions_core::error::Error::transient_io(err.to_string()))?;

        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = reader
                .read_line(&mut line)
                .await
                .map_err(|err| sessions_core::error::Error::transient_io(err.to_string()))?;
            if read == 0 {
                break;
            }
            self.offset += read as u64;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        Ok(lines)
    }

    /// Runs until `shutdown` fires, forwarding each batch of new lines on
    /// `line_tx`. Wakes on filesystem notification or the poll interval,
    /// whichever comes first.
    pub async fn run(mut self, line_tx: mpsc::Sender<String>, shutdown: CancellationToken) {
        let (_watcher, mut wake_rx) = setup_notify_watcher(&self.path);
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = wake_rx.recv() => {}
                _ = interval.tick() => {}
            }

            match self.read_new_lines().await {
                Ok(lines) => {
                    for line in lines {
                        if line_tx.send(line).await.is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), error = %err, "telemetry tail read failed");
                }
            }
        }
    }
}

fn setup_notify_watcher(path: &std::path::Path) -> (Option<notify::RecommendedWatcher>, mpsc::Receiver<()>) {
    let (wake_tx, wake_rx) = mpsc::channel(8);
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => return (None, wake_rx),
    };

    let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if res.is_ok() {
            let _ = wake_tx.try_send(());
        }
    });

    let mut watcher = match watcher {
        Ok(watcher) => watcher,
        Err(err) => {
            tracing::warn!(error = %err, "failed to construct telemetry file watcher");
            return (None, wake_rx);
        }
    };

    if let Err(err) = watcher.watch(&parent, RecursiveMode::NonRecursive) {
        tracing::warn!(path = %parent.display(), error = %err, "failed to watch telemetry directory");
        return (None, wake_rx);
    }

    (Some(watcher), wake_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn missing_file_yields_empty_lines() {
        let mut tailer = TelemetryTailer::new(PathBuf::from("/nonexistent/telemetry.jsonl"));
        let lines = tailer.read_new_lines().await.expect("no error on missing file");
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn reads_only_newly_appended_complete_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("telemetry.jsonl");
        std::fs::write(&path, "line-one\n").expect("write");

        let mut tailer = TelemetryTailer::new(path.clone());
        let first = tailer.read_new_lines().await.expect("read");
        assert_eq!(first, vec!["line-one".to_string()]);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).expect("open append");
        writeln!(file, "line-two").expect("append");

        let second = tailer.read_new_lines().await.expect("read");
        assert_eq!(second, vec!["line-two".to_string()]);
    }

    #[tokio::test]
    async fn truncation_resets_offset_to_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("telemetry.jsonl");
        std::fs::write(&path, "line-one\nline-two\n").expect("write");

        let mut tailer = TelemetryTailer::new(path.clone());
        tailer.read_new_lines().await.expect("read");
        assert!(tailer.offset() > 0);

        std::fs::write(&path, "fresh\n").expect("truncate and rewrite");
        let lines = tailer.read_new_lines().await.expect("read after truncation");
        assert_eq!(lines, vec!["fresh".to_string()]);
    }
}
