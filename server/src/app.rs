//! `AppServer` is constructed once in `main` and threaded through every
//! handler via axum's `State` extractor — never a module-scoped global.

use std::ops::Deref;
use std::sync::Arc;

use rterm_core::category::CategoryService;
use rterm_core::config::Config;
use rterm_core::error::{CoreError, CoreResult};
use rterm_core::notify::NotificationBus;
use rterm_core::ratelimit::RateLimiter;
use rterm_core::session::SessionManager;
use rterm_core::store::Store;

use crate::connection::ConnectionRegistry;
use crate::identity::{build_identity, Identity};

pub struct AppServerInner {
    pub sessions: Arc<SessionManager>,
    pub categories: CategoryService,
    pub rate_limiter: Arc<RateLimiter>,
    pub notifications: Arc<NotificationBus>,
    pub identity: Arc<dyn Identity>,
    pub connections: ConnectionRegistry,
    pub config: Config,
}

/// Cheaply cloneable handle axum's `State` extractor copies into every
/// handler call.
#[derive(Clone)]
pub struct AppServer(Arc<AppServerInner>);

impl Deref for AppServer {
    type Target = AppServerInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AppServer {
    pub fn new(config: Config) -> CoreResult<Self> {
        let store = Arc::new(Store::open(&config.db_path()).map_err(CoreError::from)?);
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&store),
            config.scrollback_lines,
            config.max_sessions,
            config.idle_timeout_minutes,
        ));
        sessions.spawn_idle_reaper();
        let categories = CategoryService::new(Arc::clone(&store));
        let rate_limiter = Arc::new(RateLimiter::default());
        let notifications = Arc::new(NotificationBus::new());
        let identity: Arc<dyn Identity> = Arc::from(build_identity(&config));
        let connections = ConnectionRegistry::new();

        Ok(Self(Arc::new(AppServerInner {
            sessions,
            categories,
            rate_limiter,
            notifications,
            identity,
            connections,
            config,
        })))
    }

    /// Graceful shutdown: drain the Session Manager, the rest (store,
    /// transports) cleans up as `AppServer`'s `Arc`s drop.
    pub async fn shutdown(&self) {
        self.sessions.shutdown().await;
    }
}
