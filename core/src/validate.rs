//! Shape/bound validators shared by the Session Manager (which enforces them
//! on every public entry point) and the server's Connection
//! Handler (which enforces them again at the wire boundary before a frame's
//! payload ever reaches the manager). Duplication is deliberate:
//! a caller driving `rterm_core` directly gets the same guarantees a
//! WebSocket client does.

use once_cell_shell::shell_pattern;

use crate::error::{CoreError, CoreResult};

const MAX_NAME_LEN: usize = 100;
const MAX_CWD_LEN: usize = 500;
const MIN_DIM: u16 = 1;
const MAX_DIM: u16 = 500;

pub fn validate_name(name: &str) -> CoreResult<String> {
    let trimmed = name.trim();
    if trimmed.len() > MAX_NAME_LEN {
        return Err(CoreError::InvalidInput(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_shell(shell: &str) -> CoreResult<()> {
    if shell_pattern().is_match(shell) {
        Ok(())
    } else {
        Err(CoreError::InvalidInput(
            "shell must match [A-Za-z0-9/_.-]+".to_string(),
        ))
    }
}

pub fn validate_cwd(cwd: &str) -> CoreResult<()> {
    if cwd.len() > MAX_CWD_LEN {
        return Err(CoreError::InvalidInput(format!(
            "cwd must be at most {MAX_CWD_LEN} characters"
        )));
    }
    if cwd.contains("..") {
        return Err(CoreError::InvalidInput("cwd must not contain `..`".to_string()));
    }
    Ok(())
}

pub fn validate_dim(value: i64, label: &str) -> CoreResult<u16> {
    if value < MIN_DIM as i64 || value > MAX_DIM as i64 {
        return Err(CoreError::InvalidInput(format!(
            "{label} must be in [{MIN_DIM}, {MAX_DIM}]"
        )));
    }
    Ok(value as u16)
}

/// Small private helper module so the shell regex is compiled once (`Lazy`)
/// without pulling in a crate just for this file.
mod once_cell_shell {
    use regex::Regex;
    use std::sync::OnceLock;

    pub fn shell_pattern() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9/_.\-]+$").unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_trimmed_and_bounded() {
        assert_eq!(validate_name("  hi  ").unwrap(), "hi");
        assert!(validate_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn shell_rejects_shell_metacharacters() {
        assert!(validate_shell("/bin/bash").is_ok());
        assert!(validate_shell("bash; rm -rf /").is_err());
    }

    #[test]
    fn cwd_rejects_parent_traversal() {
        assert!(validate_cwd("/home/user/project").is_ok());
        assert!(validate_cwd("/home/user/../etc").is_err());
    }

    #[test]
    fn dims_are_bounded_inclusive() {
        assert!(validate_dim(1, "cols").is_ok());
        assert!(validate_dim(500, "cols").is_ok());
        assert!(validate_dim(0, "cols").is_err());
        assert!(validate_dim(501, "cols").is_err());
    }
}
