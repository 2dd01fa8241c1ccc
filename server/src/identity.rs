//! Identity collaborator: resolves a connecting client to a principal, or
//! rejects it. The real peer→user resolver (SSO, a reverse-proxy header,
//! mTLS client cert) is an external collaborator out of scope for this
//! crate; `resolve` is handed whatever claimed username the upgrade request
//! carried and decides from there, before the connection reaches the Open
//! state.

use rterm_core::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub login_name: String,
    pub display_name: String,
}

/// Resolves a claimed user to a `Principal`, or rejects the connection
/// (closed with code 4001).
pub trait Identity: Send + Sync {
    fn resolve(&self, claimed_user: Option<&str>) -> Result<Principal, ()>;

    /// Surfaced at `GET /health`.
    fn describe(&self) -> &'static str;
}

/// Used when `auth.enabled=false`: every connection resolves to the same
/// anonymous principal regardless of what it claims.
pub struct AnonymousIdentity;

impl Identity for AnonymousIdentity {
    fn resolve(&self, _claimed_user: Option<&str>) -> Result<Principal, ()> {
        Ok(Principal {
            user_id: "anonymous".to_string(),
            login_name: "anonymous".to_string(),
            display_name: "Anonymous".to_string(),
        })
    }

    fn describe(&self) -> &'static str {
        "anonymous"
    }
}

/// Used when `auth.enabled=true`: the claimed user must appear in
/// `auth.allowedUsers`, otherwise the connection is rejected.
pub struct AllowlistIdentity {
    allowed: Vec<String>,
}

impl AllowlistIdentity {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }
}

impl Identity for AllowlistIdentity {
    fn resolve(&self, claimed_user: Option<&str>) -> Result<Principal, ()> {
        let user = claimed_user.ok_or(())?;
        if self.allowed.iter().any(|u| u == user) {
            Ok(Principal {
                user_id: user.to_string(),
                login_name: user.to_string(),
                display_name: user.to_string(),
            })
        } else {
            Err(())
        }
    }

    fn describe(&self) -> &'static str {
        "allowlist"
    }
}

/// Builds the configured `Identity` implementation: a single `Identity`
/// trait with two implementations, switched on by `auth.enabled`, rather
/// than a feature flag sprinkled through the rest of the code.
pub fn build_identity(cfg: &Config) -> Box<dyn Identity> {
    if cfg.auth_enabled {
        Box::new(AllowlistIdentity::new(cfg.auth_allowed_users.clone()))
    } else {
        Box::new(AnonymousIdentity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_accepts_anything() {
        let id = AnonymousIdentity;
        assert!(id.resolve(None).is_ok());
        assert!(id.resolve(Some("whoever")).is_ok());
    }

    #[test]
    fn allowlist_rejects_unknown_and_missing_claim() {
        let id = AllowlistIdentity::new(vec!["alice".to_string()]);
        assert!(id.resolve(Some("alice")).is_ok());
        assert!(id.resolve(Some("bob")).is_err());
        assert!(id.resolve(None).is_err());
    }

    #[test]
    fn build_identity_matches_config_flag() {
        let mut cfg = Config::default();
        assert_eq!(build_identity(&cfg).describe(), "anonymous");
        cfg.auth_enabled = true;
        assert_eq!(build_identity(&cfg).describe(), "allowlist");
    }
}
