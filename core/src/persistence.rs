//! Persistence Helper: whether a terminated session's shell survives under
//! an external multiplexer, or whether the core falls back to stashing a
//! scrollback blob in the Metadata Store. Capability is probed once at
//! `SessionManager` construction and cached, not branched on per call.

use std::process::Command;

/// Which strategy a `SessionManager` uses to survive a terminated/restarted
/// session. Decided once at construction from `tmux_available()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceBackend {
    /// `tmux` is on `$PATH`; sessions run inside a named tmux session that
    /// outlives the server process.
    TmuxMultiplexer,
    /// No external multiplexer; scrollback is written to the store on
    /// terminate/exit/shutdown and replayed on next attach.
    StoredScrollback,
}

impl PersistenceBackend {
    /// Probe `$PATH` for `tmux` once; callers cache the result.
    pub fn detect() -> Self {
        if tmux_available() {
            PersistenceBackend::TmuxMultiplexer
        } else {
            PersistenceBackend::StoredScrollback
        }
    }
}

fn tmux_available() -> bool {
    Command::new("tmux")
        .arg("-V")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// tmux session handle name for a given rterm session id.
pub fn tmux_handle_name(session_id: &str) -> String {
    format!("rterm-{session_id}")
}

/// Tears down a tmux handle on terminate. Idempotent: killing an already-gone
/// session is not an error to the caller (tmux itself returns non-zero, which
/// is logged and swallowed, consistent with "PTY errors are logged only").
pub fn tmux_kill_session(handle: &str) -> std::io::Result<()> {
    let status = Command::new("tmux")
        .args(["kill-session", "-t", handle])
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!(
            "tmux kill-session exited with {status}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_name_is_namespaced() {
        assert_eq!(tmux_handle_name("abc-123"), "rterm-abc-123");
    }
}
