//! Axum HTTP + WebSocket front door: `/ws` for the terminal attach protocol
//! (see `connection::handle_socket`), a small JSON API for sessions and the
//! out-of-band notification hook, and `/health`.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use rterm_core::notify::NotificationKind;

use crate::app::AppServer;
use crate::connection;

/// Header a reverse proxy (or a trusted test client) sets to the resolved
/// username. `Identity::resolve` decides whether to trust it.
const CLAIMED_USER_HEADER: &str = "x-rterm-user";

#[derive(Debug, Deserialize)]
struct WsQuery {
    user: Option<String>,
}

fn claimed_user(headers: &HeaderMap, query_user: Option<String>) -> Option<String> {
    headers
        .get(CLAIMED_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(query_user)
}

pub fn router(app: AppServer) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/sessions", get(list_sessions_handler))
        .route("/api/notify/{session_id}/{kind}", post(notify_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}

async fn ws_handler(
    State(app): State<AppServer>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let user = claimed_user(&headers, query.user);
    ws.on_upgrade(move |socket| connection::handle_socket(socket, app, user))
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthOut {
    status: &'static str,
    session_count: usize,
    identity_provider: &'static str,
}

async fn health_handler(State(app): State<AppServer>) -> Json<HealthOut> {
    let session_count = app.sessions.list().await.map(|v| v.len()).unwrap_or(0);
    Json(HealthOut {
        status: "ok",
        session_count,
        identity_provider: app.identity.describe(),
    })
}

async fn list_sessions_handler(State(app): State<AppServer>) -> Response {
    match app.sessions.list().await {
        Ok(views) => Json(views).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `POST /api/notify/{sessionId}/{kind}` — the out-of-band hook ingress.
/// Goes through the same identity gate as `/ws`, since this endpoint can
/// wake up a user-facing notification just like a live connection can.
async fn notify_handler(
    State(app): State<AppServer>,
    Path((session_id, kind)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let user = claimed_user(&headers, None);
    if app.identity.resolve(user.as_deref()).is_err() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let kind = match NotificationKind::parse(&kind) {
        Some(k) => k,
        None => return (StatusCode::BAD_REQUEST, "invalid notification kind").into_response(),
    };
    info!(event = "notify.hook.received", session_id = %session_id, kind = %kind.as_str());
    app.notifications.publish(&session_id, kind);
    StatusCode::OK.into_response()
}
