// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! True PTY binding for interactive terminal clients (§4.2). Forks a child
//! that execs `tmux attach-session -t <pane>`, giving the client a real
//! pseudoterminal wired to the live pane instead of the polling/diffing
//! path the Supervisor uses for output capture.

use std::ffi::CString;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use nix::libc;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execvp, Pid};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

use sessions_core::error::{Error, Result};

use crate::nbio::{read_chunk, set_nonblocking, write_all, PtyMasterFd};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtyExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// One forked `tmux attach-session` child wired to a pseudoterminal.
pub struct AttachedPty {
    master: AsyncFd<PtyMasterFd>,
    child_pid: Pid,
    cols: Arc<AtomicU16>,
    rows: Arc<AtomicU16>,
}

impl AttachedPty {
    /// `argv` must be non-empty; `argv[0]` is the program to exec (in
    /// practice `tmux`).
    #[allow(unsafe_code)]
    pub fn spawn(argv: &[String], cols: u16, rows: u16) -> Result<Self> {
        if argv.is_empty() {
            return Err(Error::invariant("pty spawn requires a non-empty argv"));
        }
        let winsize = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: the child is partially initialized until execvp; no heap
        // allocation or non-async-signal-safe call happens between fork and
        // exec in the child branch below.
        let fork_result =
            unsafe { forkpty(&winsize, None) }.map_err(|e| Error::external(format!("forkpty failed: {e}")))?;

        match fork_result {
            ForkptyResult::Child => {
                std::env::set_var("TERM", "xterm-256color");
                let c_args: Vec<CString> = match argv.iter().map(|s| CString::new(s.as_bytes())).collect() {
                    Ok(args) => args,
                    Err(_) => std::process::exit(127),
                };
                let _ = execvp(&c_args[0], &c_args);
                std::process::exit(127);
            }
            ForkptyResult::Parent { child, master } => {
                set_nonblocking(&master).map_err(|e| Error::external(format!("set_nonblocking failed: {e}")))?;
                let afd = AsyncFd::new(PtyMasterFd(master))
                    .map_err(|e| Error::external(format!("AsyncFd::new failed: {e}")))?;
                Ok(Self {
                    master: afd,
                    child_pid: child,
                    cols: Arc::new(AtomicU16::new(cols)),
                    rows: Arc::new(AtomicU16::new(rows)),
                })
            }
        }
    }

    /// Runs the read/write pump until the PTY closes or the child exits.
    /// `output_tx` receives raw bytes read from the pane; `input_rx`
    /// carries bytes to forward to the pane; `resize_rx` carries
    /// `(cols, rows)` updates applied via `TIOCSWINSZ`.
    pub async fn run(
        mut self,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<Bytes>,
        mut resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> Result<PtyExitStatus> {
        let mut buf = vec![0u8; 8192];
        let mut input_closed = false;

        loop {
            if input_closed {
                match read_chunk(&self.master, &mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            break;
                        }
                    }
                    Err(e) if e.raw_os_error() == Some(libc::EIO) => break,
                    Err(e) => return Err(Error::external(format!("pty read failed: {e}"))),
                }
            } else {
                tokio::select! {
                    result = read_chunk(&self.master, &mut buf) => {
                        match result {
                            Ok(0) => break,
                            Ok(n) => {
                                if output_tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) if e.raw_os_error() == Some(libc::EIO) => break,
                            Err(e) => return Err(Error::external(format!("pty read failed: {e}"))),
                        }
                    }
                    input = input_rx.recv() => {
                        match input {
                            Some(data) => write_all(&self.master, &data).await
                                .map_err(|e| Error::external(format!("pty write failed: {e}")))?,
                            None => input_closed = true,
                        }
                    }
                    resize = resize_rx.recv() => {
                        if let Some((cols, rows)) = resize {
                            self.resize(cols, rows)?;
                        }
                    }
                }
            }
        }

        let pid = self.child_pid;
        tokio::task::spawn_blocking(move || wait_for_exit(pid))
            .await
            .map_err(|e| Error::external(format!("failed to join pty reaper thread: {e}")))?
    }

    #[allow(unsafe_code)]
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.cols.store(cols, Ordering::Relaxed);
        self.rows.store(rows, Ordering::Relaxed);
        let ws = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: TIOCSWINSZ is the standard ioctl for setting a PTY's
        // window size; `ws` is fully initialized and the fd is owned.
        let ret = unsafe { libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &ws) };
        if ret < 0 {
            return Err(Error::external(format!(
                "TIOCSWINSZ ioctl failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    pub fn child_pid(&self) -> u32 {
        self.child_pid.as_raw() as u32
    }
}

impl Drop for AttachedPty {
    fn drop(&mut self) {
        let _ = kill(self.child_pid, Signal::SIGHUP);
        std::thread::sleep(std::time::Duration::from_millis(50));
        let _ = kill(self.child_pid, Signal::SIGKILL);
        let _ = waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG));
    }
}

fn wait_for_exit(pid: Pid) -> Result<PtyExitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(PtyExitStatus { code: Some(code), signal: None }),
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                return Ok(PtyExitStatus { code: None, signal: Some(sig as i32) })
            }
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(Error::external(format!("waitpid failed: {e}"))),
        }
    }
}
