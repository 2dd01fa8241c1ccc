//! PTY adapter: spawn a shell attached to a pseudo-terminal and bridge its
//! I/O to async callers. The child is wrapped in a `Mutex` so a dedicated
//! thread can poll `try_wait()` while writes come from elsewhere.

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{self, Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{CoreError, CoreResult};

/// Inputs to [`spawn`]. `env` is an overlay on top of the inherited
/// environment; `TERM`, `COLORTERM`, and `RTERM_SESSION_ID` are always added
/// on top of whatever the caller supplies.
pub struct SpawnOptions {
    pub shell: String,
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub cols: u16,
    pub rows: u16,
    pub env: Vec<(String, String)>,
    pub session_id: String,
    /// When set, the PTY's child is `tmux new-session -A -s <handle> …
    /// <shell>` instead of the shell directly, so the shell actually runs
    /// inside the named tmux session and survives this process restarting.
    pub tmux_handle: Option<String>,
}

/// Sender used to request a PTY resize; a dedicated thread drains it and
/// calls `master.resize()`.
pub type ResizeSender = sync::mpsc::Sender<(u16, u16)>;

/// Opaque handle to a running PTY child. `write`/`resize`/`kill` errors are
/// logged and swallowed per §4.B — only `spawn` itself is fallible.
pub struct PtyHandle {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    child: Arc<Mutex<Box<dyn portable_pty::Child + Send + Sync>>>,
    resize_tx: ResizeSender,
}

impl PtyHandle {
    pub fn write(&self, data: &[u8]) {
        let mut guard = match self.writer.lock() {
            Ok(g) => g,
            Err(_) => {
                warn!(event = "pty.write.poisoned");
                return;
            }
        };
        if let Err(e) = guard.write_all(data) {
            warn!(event = "pty.write.failed", error = %e);
            return;
        }
        if let Err(e) = guard.flush() {
            warn!(event = "pty.flush.failed", error = %e);
        }
    }

    pub fn resize(&self, cols: u16, rows: u16) {
        if self.resize_tx.send((cols, rows)).is_err() {
            warn!(event = "pty.resize.channel_closed");
        }
    }

    pub fn kill(&self) {
        let mut guard = match self.child.lock() {
            Ok(g) => g,
            Err(_) => {
                warn!(event = "pty.kill.poisoned");
                return;
            }
        };
        if let Err(e) = guard.kill() {
            warn!(event = "pty.kill.failed", error = %e);
        }
    }
}

/// Spawn a shell in a PTY. Returns the handle plus a bounded channel of raw
/// output chunks and a one-shot-ish channel that yields the exit code once
/// and then closes. Callers drive their own on-data/on-exit callbacks off
/// these channels (the Session Manager forwards into the scrollback ring and
/// fan-out list).
pub fn spawn(opts: SpawnOptions) -> CoreResult<(PtyHandle, mpsc::Receiver<Vec<u8>>, mpsc::Receiver<u32>)> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: opts.rows,
            cols: opts.cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| CoreError::PtySpawn(e.to_string()))?;

    let mut cmd = match &opts.tmux_handle {
        Some(handle) => {
            // `-A` attaches to `handle` if it already exists (the restart
            // case) and otherwise creates it running `opts.shell`, so the
            // shell is the tmux session's own process rather than a sibling
            // of it.
            let mut c = CommandBuilder::new("tmux");
            c.arg("new-session");
            c.arg("-A");
            c.arg("-s");
            c.arg(handle);
            if let Some(cwd) = &opts.cwd {
                c.arg("-c");
                c.arg(cwd);
            }
            c.arg(&opts.shell);
            for arg in &opts.argv {
                c.arg(arg);
            }
            c
        }
        None => {
            let mut c = CommandBuilder::new(&opts.shell);
            for arg in &opts.argv {
                c.arg(arg);
            }
            if let Some(cwd) = &opts.cwd {
                c.cwd(cwd);
            }
            c
        }
    };
    for (k, v) in &opts.env {
        cmd.env(k, v);
    }
    cmd.env("TERM", "xterm-256color");
    cmd.env("COLORTERM", "truecolor");
    cmd.env("RTERM_SESSION_ID", &opts.session_id);

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| CoreError::PtySpawn(e.to_string()))?;

    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| CoreError::PtySpawn(e.to_string()))?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| CoreError::PtySpawn(e.to_string()))?;
    let master = pair.master;

    let (data_tx, data_rx) = mpsc::channel::<Vec<u8>>(256);
    let (resize_tx, resize_rx) = sync::mpsc::channel::<(u16, u16)>();
    let (exit_tx, exit_rx) = mpsc::channel::<u32>(1);

    let child = Arc::new(Mutex::new(child));

    // Dedicated reader thread: blocking PTY reads are not a good fit for the
    // spawn_blocking pool under sustained load, so this gets its own thread
    // rather than borrowing a runtime worker.
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if data_tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(event = "pty.read.failed", error = %e);
                    break;
                }
            }
        }
    });

    // Dedicated resize thread.
    std::thread::spawn(move || {
        while let Ok((cols, rows)) = resize_rx.recv() {
            let size = PtySize {
                cols,
                rows,
                pixel_width: 0,
                pixel_height: 0,
            };
            if let Err(e) = master.resize(size) {
                warn!(event = "pty.resize.failed", error = %e);
            }
        }
    });

    // Exit-poll thread: try_wait() at a 1s cadence, report once.
    let child_poll = Arc::clone(&child);
    std::thread::spawn(move || loop {
        let exit_code = {
            let mut guard = match child_poll.lock() {
                Ok(g) => g,
                Err(_) => break,
            };
            match guard.try_wait() {
                Ok(None) => None,
                Ok(Some(status)) => Some(status.exit_code()),
                Err(e) => {
                    warn!(event = "pty.wait.failed", error = %e);
                    break;
                }
            }
        };
        if let Some(code) = exit_code {
            let _ = exit_tx.blocking_send(code);
            break;
        }
        std::thread::sleep(std::time::Duration::from_secs(1));
    });

    let handle = PtyHandle {
        writer: Arc::new(Mutex::new(writer)),
        child,
        resize_tx,
    };
    Ok((handle, data_rx, exit_rx))
}

/// Default interactive login shell for a bare `session.create` with no shell
/// override: `bash -l` on Unix, `cmd.exe` on Windows.
pub fn default_shell() -> (String, Vec<String>) {
    #[cfg(unix)]
    {
        ("bash".to_string(), vec!["-l".to_string()])
    }
    #[cfg(windows)]
    {
        ("cmd.exe".to_string(), vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shell_is_login_shell_on_unix() {
        #[cfg(unix)]
        {
            let (shell, argv) = default_shell();
            assert_eq!(shell, "bash");
            assert_eq!(argv, vec!["-l".to_string()]);
        }
    }
}
