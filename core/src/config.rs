//! Global config. `Config::load` reads an optional JSON file once (defaults
//! fill in anything missing), then individual `RTERM_`-prefixed environment
//! variables override single keys.

use std::path::{Path, PathBuf};

const DEFAULT_PORT: u16 = 4220;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_MAX_SESSIONS: usize = 10;
const DEFAULT_IDLE_TIMEOUT_MINUTES: u64 = 0;
const DEFAULT_SCROLLBACK_LINES: usize = 10_000;

/// Resolved server configuration. Built once via [`Config::load`] and passed
/// into `AppServer`; never a module-scoped global, per the Design Notes on
/// singleton construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub server_host: String,
    pub max_sessions: usize,
    /// 0 disables idle reaping.
    pub idle_timeout_minutes: u64,
    pub scrollback_lines: usize,
    pub auth_enabled: bool,
    pub auth_allowed_users: Vec<String>,
    /// Per-user data directory holding the metadata database and logs.
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_PORT,
            server_host: DEFAULT_HOST.to_string(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_timeout_minutes: DEFAULT_IDLE_TIMEOUT_MINUTES,
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
            auth_enabled: false,
            auth_allowed_users: Vec::new(),
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load defaults, overlay `path` if it exists and parses, then apply
    /// `RTERM_*` environment overrides. Never fails: a missing or malformed
    /// file just means defaults are used.
    pub fn load(path: Option<&Path>) -> Self {
        let mut cfg = Self::default();
        if let Some(path) = path {
            cfg.overlay_file(path);
        }
        cfg.overlay_env();
        cfg
    }

    fn overlay_file(&mut self, path: &Path) {
        let Ok(data) = std::fs::read_to_string(path) else {
            return;
        };
        let Ok(root) = serde_json::from_str::<serde_json::Value>(&data) else {
            return;
        };

        if let Some(v) = root.pointer("/server/port").and_then(|v| v.as_u64()) {
            self.server_port = v as u16;
        }
        if let Some(v) = root.pointer("/server/host").and_then(|v| v.as_str()) {
            self.server_host = v.to_string();
        }
        if let Some(v) = root.pointer("/sessions/maxSessions").and_then(|v| v.as_u64()) {
            self.max_sessions = v as usize;
        }
        if let Some(v) = root
            .pointer("/sessions/idleTimeoutMinutes")
            .and_then(|v| v.as_u64())
        {
            self.idle_timeout_minutes = v;
        }
        if let Some(v) = root
            .pointer("/persistence/scrollbackLines")
            .and_then(|v| v.as_u64())
        {
            self.scrollback_lines = v as usize;
        }
        if let Some(v) = root.pointer("/auth/enabled").and_then(|v| v.as_bool()) {
            self.auth_enabled = v;
        }
        if let Some(v) = root.pointer("/auth/allowedUsers").and_then(|v| v.as_array()) {
            self.auth_allowed_users = v
                .iter()
                .filter_map(|u| u.as_str().map(str::to_string))
                .collect();
        }
        if let Some(v) = root.pointer("/dataDir").and_then(|v| v.as_str()) {
            self.data_dir = PathBuf::from(v);
        }
    }

    fn overlay_env(&mut self) {
        if let Ok(v) = std::env::var("RTERM_SERVER__PORT") {
            if let Ok(port) = v.parse() {
                self.server_port = port;
            }
        }
        if let Ok(v) = std::env::var("RTERM_SERVER__HOST") {
            self.server_host = v;
        }
        if let Ok(v) = std::env::var("RTERM_SESSIONS__MAX_SESSIONS") {
            if let Ok(n) = v.parse() {
                self.max_sessions = n;
            }
        }
        if let Ok(v) = std::env::var("RTERM_SESSIONS__IDLE_TIMEOUT_MINUTES") {
            if let Ok(n) = v.parse() {
                self.idle_timeout_minutes = n;
            }
        }
        if let Ok(v) = std::env::var("RTERM_AUTH__ENABLED") {
            self.auth_enabled = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }

    /// Path to the metadata database file under `data_dir`.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("rterm.db")
    }

    /// Log directory under `data_dir`, used by the server's file appender.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rterm")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_stable() {
        let cfg = Config::default();
        assert_eq!(cfg.server_port, 4220);
        assert_eq!(cfg.server_host, "0.0.0.0");
        assert_eq!(cfg.max_sessions, 10);
        assert_eq!(cfg.idle_timeout_minutes, 0);
        assert_eq!(cfg.scrollback_lines, 10_000);
        assert!(!cfg.auth_enabled);
        assert!(cfg.auth_allowed_users.is_empty());
    }

    #[test]
    fn file_overlay_overrides_individual_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"server":{{"port":9000}},"sessions":{{"maxSessions":3}},"auth":{{"enabled":true,"allowedUsers":["alice"]}}}}"#
        )
        .unwrap();

        let cfg = Config::load(Some(&path));
        assert_eq!(cfg.server_port, 9000);
        assert_eq!(cfg.max_sessions, 3);
        assert!(cfg.auth_enabled);
        assert_eq!(cfg.auth_allowed_users, vec!["alice".to_string()]);
        // Untouched keys keep their defaults.
        assert_eq!(cfg.idle_timeout_minutes, 0);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = Config::load(Some(Path::new("/nonexistent/path/config.json")));
        assert_eq!(cfg.server_port, 4220);
    }
}
