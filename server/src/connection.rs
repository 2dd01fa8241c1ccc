//! Connection Handler: the per-client state machine that sits between one
//! WebSocket and the core library. Owns the transport, the
//! client's rate-limit bucket key, its single attachment, and its two
//! cancellable subscription tokens (data, exit) plus a notification
//! subscription registered for the lifetime of the connection.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use rterm_core::error::CoreError;
use rterm_core::notify::{Notification, NotificationKind};
use rterm_core::protocol::{
    self, CategoryCreatePayload, CategoryIdPayload, CategoryRenamePayload, CategoryReorderPayload,
    CategoryTogglePayload, Frame, NotificationPreferencesSetPayload, OutFrame, SessionCreatePayload,
    SessionIdPayload, SessionMovePayload, SessionRenamePayload, TerminalDataPayload, TerminalResizePayload,
};
use rterm_core::session::{ClientId, CreateOptions, SessionId, SessionView};
use rterm_core::store::NotificationPreferences;
use rterm_core::subscription::Subscription;

use crate::app::AppServer;
use crate::identity::Principal;

const OUTBOUND_CAPACITY: usize = 256;
/// Number of consecutive full-channel drops before a slow client is
/// disconnected. There is no true backpressure signal over a WebSocket, so
/// a client that can't keep draining its outbound channel is treated as
/// gone.
const OVERFLOW_DISCONNECT_THRESHOLD: u32 = 32;

/// One client's outbound half: a bounded channel plus an overflow counter.
/// `try_send` never blocks the PTY reader or the fan-out dispatcher.
pub struct Outbound {
    tx: mpsc::Sender<Message>,
    overflow: AtomicU32,
    closing: watch::Sender<bool>,
}

impl Outbound {
    pub fn send_frame(&self, text: String) {
        match self.tx.try_send(Message::Text(text.into())) {
            Ok(()) => {
                self.overflow.store(0, Ordering::Relaxed);
            }
            Err(_) => {
                let n = self.overflow.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(event = "connection.outbound.overflow", count = n);
                if n >= OVERFLOW_DISCONNECT_THRESHOLD {
                    warn!(event = "connection.outbound.disconnecting_slow_client");
                    let _ = self.closing.send(true);
                }
            }
        }
    }

    /// Closes the connection with a policy-violation code. Used to reject
    /// binary frames, which this protocol has no use for.
    fn close_with(&self, code: u16, reason: &'static str) {
        let _ = self.tx.try_send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })));
        let _ = self.closing.send(true);
    }
}

enum Internal {
    Exit(SessionId, u32),
    SessionTerminated(SessionId),
}

struct ConnHandle {
    outbound: Arc<Outbound>,
    internal: mpsc::UnboundedSender<Internal>,
}

/// Server-wide table of open connections, used only for the broadcasts §4.H
/// names (`session.terminated`, `session.deleted`, `session.moved`,
/// `category.*`). Distinct from the `SessionManager`'s attached-client
/// bookkeeping, which is per-session rather than per-connection.
pub struct ConnectionRegistry {
    conns: DashMap<ClientId, ConnHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self { conns: DashMap::new() }
    }

    fn register(&self, id: ClientId, outbound: Arc<Outbound>, internal: mpsc::UnboundedSender<Internal>) {
        self.conns.insert(id, ConnHandle { outbound, internal });
    }

    fn remove(&self, id: ClientId) {
        self.conns.remove(&id);
    }

    fn broadcast_text(&self, text: &str, exclude: Option<ClientId>) {
        for entry in self.conns.iter() {
            if Some(*entry.key()) == exclude {
                continue;
            }
            entry.value().outbound.send_frame(text.to_string());
        }
    }

    fn notify_session_terminated(&self, id: SessionId) {
        for entry in self.conns.iter() {
            let _ = entry.value().internal.send(Internal::SessionTerminated(id));
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-connection mutable state, owned exclusively by this connection's
/// task: no lock contention across clients, since each connection's task
/// exclusively owns its own state.
struct ConnState {
    app: AppServer,
    client_id: ClientId,
    principal: Principal,
    outbound: Arc<Outbound>,
    attached: Option<SessionId>,
    data_sub: Option<Subscription>,
    exit_sub: Option<Subscription>,
    notify_sub: Option<Subscription>,
    prefs: Arc<Mutex<NotificationPreferences>>,
}

/// Drives one WebSocket connection end to end: resolves identity (Pending),
/// then loops processing frames until the transport closes or the server
/// disconnects a slow/unauthorized client.
pub async fn handle_socket(socket: WebSocket, app: AppServer, claimed_user: Option<String>) {
    let client_id = app.sessions.next_client_id();

    let principal = match app.identity.resolve(claimed_user.as_deref()) {
        Ok(p) => p,
        Err(()) => {
            let (mut sender, _receiver) = socket.split();
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: 4001,
                    reason: "Unauthorized".into(),
                })))
                .await;
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
    let (closing_tx, mut closing_rx) = watch::channel(false);
    let (internal_tx, mut internal_rx) = mpsc::unbounded_channel::<Internal>();

    let outbound = Arc::new(Outbound {
        tx: out_tx,
        overflow: AtomicU32::new(0),
        closing: closing_tx,
    });

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    app.connections.register(client_id, Arc::clone(&outbound), internal_tx.clone());

    let initial_prefs = app
        .categories
        .get_preferences(&principal.user_id)
        .await
        .unwrap_or(NotificationPreferences {
            user_id: principal.user_id.clone(),
            browser_enabled: true,
            visual_enabled: true,
            notify_on_input: true,
            notify_on_completed: true,
            updated_at: 0,
        });
    let prefs = Arc::new(Mutex::new(initial_prefs));

    let notify_sub = {
        let prefs = Arc::clone(&prefs);
        let outbound = Arc::clone(&outbound);
        app.notifications.subscribe(Box::new(move |note: &Notification| {
            let allowed = {
                let p = prefs.lock().expect("poisoned");
                match note.kind {
                    NotificationKind::NeedsInput => p.notify_on_input,
                    NotificationKind::Completed => p.notify_on_completed,
                }
            };
            if allowed {
                outbound.send_frame(OutFrame::event("notification", note.clone()).to_text());
            }
        }))
    };

    let mut state = ConnState {
        app: app.clone(),
        client_id,
        principal: principal.clone(),
        outbound: Arc::clone(&outbound),
        attached: None,
        data_sub: None,
        exit_sub: None,
        notify_sub: Some(notify_sub),
        prefs,
    };

    state.outbound.send_frame(
        OutFrame::event(
            "auth.success",
            AuthSuccessOut {
                user_id: principal.user_id.clone(),
                login_name: principal.login_name.clone(),
                display_name: principal.display_name.clone(),
            },
        )
        .to_text(),
    );
    info!(event = "connection.open", client_id = client_id, user = %principal.user_id);

    loop {
        tokio::select! {
            _ = closing_rx.changed() => {
                if *closing_rx.borrow() {
                    break;
                }
            }
            internal = internal_rx.recv() => {
                match internal {
                    Some(Internal::Exit(id, _code)) | Some(Internal::SessionTerminated(id)) => {
                        if state.attached == Some(id) {
                            state.attached = None;
                            state.data_sub = None;
                            state.exit_sub = None;
                        }
                    }
                    None => {}
                }
            }
            maybe_msg = ws_receiver.next() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(&mut state, &text, internal_tx.clone()).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        state.outbound.send_frame_raw_close(1008, "binary frames are not supported");
                        break;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong handled by axum
                    Some(Err(e)) => {
                        warn!(event = "connection.transport.error", error = %e);
                        break;
                    }
                }
            }
        }
    }

    app.connections.remove(client_id);
    app.rate_limiter.remove(client_id);
    if let Some(id) = state.attached {
        let _ = app.sessions.detach_client(id, client_id).await;
    }
    writer.abort();
    info!(event = "connection.closed", client_id = client_id);
}

impl Outbound {
    /// Used only for the binary-frame policy-violation close: this closes
    /// the connection rather than sending a regular text frame, so it
    /// cannot reuse `send_frame`.
    fn send_frame_raw_close(&self, code: u16, reason: &str) {
        warn!(event = "connection.closing.binary_frame_rejected", code = code, reason = reason);
        let _ = self.closing.send(true);
    }
}

async fn dispatch(state: &mut ConnState, text: &str, internal_tx: mpsc::UnboundedSender<Internal>) {
    if !state.app.rate_limiter.try_acquire(state.client_id) {
        state.outbound.send_frame(error_frame(None, "Rate limit exceeded"));
        return;
    }

    let frame = match protocol::decode(text) {
        Ok(f) => f,
        Err(e) => {
            state.outbound.send_frame(error_frame(None, &e.to_string()));
            return;
        }
    };

    let id = frame.id.clone();
    match frame.ty.as_str() {
        "auth" => {
            state.outbound.send_frame(
                OutFrame::reply(
                    "auth.success",
                    id,
                    AuthSuccessOut {
                        user_id: state.principal.user_id.clone(),
                        login_name: state.principal.login_name.clone(),
                        display_name: state.principal.display_name.clone(),
                    },
                )
                .to_text(),
            );
        }
        "ping" => state.outbound.send_frame(protocol::bare_frame("pong", id)),
        "session.list" => handle_session_list(state, id).await,
        "session.create" => handle_session_create(state, frame, internal_tx).await,
        "session.attach" => handle_session_attach(state, frame, internal_tx).await,
        "session.detach" => handle_session_detach(state, id).await,
        "session.terminate" => handle_session_terminate(state, frame).await,
        "session.delete" => handle_session_delete(state, frame).await,
        "session.rename" => handle_session_rename(state, frame).await,
        "session.move" => handle_session_move(state, frame).await,
        "terminal.data" => handle_terminal_data(state, frame).await,
        "terminal.resize" => handle_terminal_resize(state, frame).await,
        "category.list" => handle_category_list(state, id).await,
        "category.create" => handle_category_create(state, frame).await,
        "category.rename" => handle_category_rename(state, frame).await,
        "category.delete" => handle_category_delete(state, frame).await,
        "category.reorder" => handle_category_reorder(state, frame).await,
        "category.toggle" => handle_category_toggle(state, frame).await,
        "notification.preferences.get" => handle_preferences_get(state, id).await,
        "notification.preferences.set" => handle_preferences_set(state, frame).await,
        "notification.dismiss" => handle_notification_dismiss(state, frame).await,
        other => {
            state
                .outbound
                .send_frame(error_frame(id, &format!("unknown message type \"{other}\"")));
        }
    }
}

// ---- helpers ----

fn error_frame(id: Option<String>, message: &str) -> String {
    OutFrame::reply("error", id, ErrorOut { message: message.to_string() }).to_text()
}

fn session_error_frame(id: Option<String>, err: &CoreError) -> String {
    OutFrame::reply("session.error", id, ErrorOut { message: err.to_string() }).to_text()
}

fn parse_session_id(raw: &str) -> Result<SessionId, CoreError> {
    SessionId::parse(raw).ok_or_else(|| CoreError::InvalidInput("invalid session id".to_string()))
}

/// Detaches whatever session is currently attached, if any. `session.attach`
/// replaces any existing attachment and `session.create` auto-detaches, so
/// this always runs first; dropping the subscriptions before the detach
/// call prevents leaking the previous data subscription.
async fn detach_current(state: &mut ConnState) {
    if let Some(id) = state.attached.take() {
        state.data_sub = None;
        state.exit_sub = None;
        let _ = state.app.sessions.detach_client(id, state.client_id).await;
    }
}

async fn attach_to(
    state: &mut ConnState,
    id: SessionId,
    reply_id: Option<String>,
    internal_tx: mpsc::UnboundedSender<Internal>,
) -> Result<(), CoreError> {
    detach_current(state).await;

    let view = state.app.sessions.get(id).await?;
    let scrollback = state.app.sessions.get_scrollback(id).await?;

    let outbound = Arc::clone(&state.outbound);
    let data_sub = state.app.sessions.subscribe_data(id, move |bytes| {
        let text = String::from_utf8_lossy(bytes).into_owned();
        outbound.send_frame(
            OutFrame::event(
                "terminal.data",
                TerminalDataOut {
                    session_id: id.to_string(),
                    data: text,
                },
            )
            .to_text(),
        );
    })?;

    let outbound = Arc::clone(&state.outbound);
    let exit_tx = internal_tx.clone();
    let exit_sub = state.app.sessions.subscribe_exit(id, move |code| {
        outbound.send_frame(
            OutFrame::event(
                "terminal.exit",
                TerminalExitOut {
                    session_id: id.to_string(),
                    exit_code: code,
                },
            )
            .to_text(),
        );
        let _ = exit_tx.send(Internal::Exit(id, code));
    })?;

    state.app.sessions.attach_client(id, state.client_id).await?;
    state.app.notifications.clear_for_session(&id.to_string());

    state.attached = Some(id);
    state.data_sub = Some(data_sub);
    state.exit_sub = Some(exit_sub);

    state.outbound.send_frame(
        OutFrame::reply(
            "session.attached",
            reply_id,
            SessionAttachedOut { session: view, scrollback },
        )
        .to_text(),
    );
    Ok(())
}

// ---- session.* handlers ----

async fn handle_session_list(state: &mut ConnState, id: Option<String>) {
    match state.app.sessions.list().await {
        Ok(views) => state.outbound.send_frame(OutFrame::reply("session.list", id, views).to_text()),
        Err(e) => state.outbound.send_frame(session_error_frame(id, &e)),
    }
}

async fn handle_session_create(state: &mut ConnState, frame: Frame, internal_tx: mpsc::UnboundedSender<Internal>) {
    let payload: SessionCreatePayload = frame
        .payload
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let opts = CreateOptions {
        name: payload.name,
        shell: payload.shell,
        cwd: payload.cwd,
        cols: payload.cols,
        rows: payload.rows,
        owner: Some(state.principal.user_id.clone()),
        env: Vec::new(),
    };

    match state.app.sessions.create(opts).await {
        Ok(view) => {
            let id = match SessionId::parse(&view.id) {
                Some(id) => id,
                None => return,
            };
            state
                .outbound
                .send_frame(OutFrame::reply("session.created", frame.id.clone(), view.clone()).to_text());
            broadcast_other(state, "session.created", view.clone());
            let _ = attach_to(state, id, None, internal_tx).await;
        }
        Err(e) => state.outbound.send_frame(session_error_frame(frame.id, &e)),
    }
}

async fn handle_session_attach(state: &mut ConnState, frame: Frame, internal_tx: mpsc::UnboundedSender<Internal>) {
    let payload: SessionIdPayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => {
            state
                .outbound
                .send_frame(session_error_frame(frame.id, &CoreError::InvalidInput("missing sessionId".to_string())));
            return;
        }
    };
    let id = match parse_session_id(&payload.session_id) {
        Ok(id) => id,
        Err(e) => {
            state.outbound.send_frame(session_error_frame(frame.id, &e));
            return;
        }
    };
    if let Err(e) = attach_to(state, id, frame.id.clone(), internal_tx).await {
        state.outbound.send_frame(session_error_frame(frame.id, &e));
    }
}

async fn handle_session_detach(state: &mut ConnState, id: Option<String>) {
    if state.attached.is_none() {
        state
            .outbound
            .send_frame(session_error_frame(id, &CoreError::InvalidInput("no session attached".to_string())));
        return;
    }
    let detached = state.attached;
    detach_current(state).await;
    state.outbound.send_frame(
        OutFrame::reply(
            "session.detached",
            id,
            SessionIdOut { session_id: detached.map(|s| s.to_string()).unwrap_or_default() },
        )
        .to_text(),
    );
}

async fn handle_session_terminate(state: &mut ConnState, frame: Frame) {
    let payload: SessionIdPayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => {
            state
                .outbound
                .send_frame(session_error_frame(frame.id, &CoreError::InvalidInput("missing sessionId".to_string())));
            return;
        }
    };
    let id = match parse_session_id(&payload.session_id) {
        Ok(id) => id,
        Err(e) => {
            state.outbound.send_frame(session_error_frame(frame.id, &e));
            return;
        }
    };
    match state.app.sessions.terminate(id).await {
        Ok(_) => {
            if state.attached == Some(id) {
                state.attached = None;
                state.data_sub = None;
                state.exit_sub = None;
            }
            let out = SessionIdOut { session_id: id.to_string() };
            state
                .outbound
                .send_frame(OutFrame::reply("session.terminated", frame.id.clone(), out.clone()).to_text());
            broadcast_other(state, "session.terminated", out);
            state.app.connections.notify_session_terminated(id);
        }
        Err(e) => state.outbound.send_frame(session_error_frame(frame.id, &e)),
    }
}

async fn handle_session_delete(state: &mut ConnState, frame: Frame) {
    let payload: SessionIdPayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => {
            state
                .outbound
                .send_frame(session_error_frame(frame.id, &CoreError::InvalidInput("missing sessionId".to_string())));
            return;
        }
    };
    let id = match parse_session_id(&payload.session_id) {
        Ok(id) => id,
        Err(e) => {
            state.outbound.send_frame(session_error_frame(frame.id, &e));
            return;
        }
    };
    match state.app.sessions.delete(id).await {
        Ok(()) => {
            if state.attached == Some(id) {
                state.attached = None;
                state.data_sub = None;
                state.exit_sub = None;
            }
            let out = SessionIdOut { session_id: id.to_string() };
            state
                .outbound
                .send_frame(OutFrame::reply("session.deleted", frame.id.clone(), out.clone()).to_text());
            broadcast_other(state, "session.deleted", out);
            state.app.connections.notify_session_terminated(id);
        }
        Err(e) => state.outbound.send_frame(session_error_frame(frame.id, &e)),
    }
}

async fn handle_session_rename(state: &mut ConnState, frame: Frame) {
    let payload: SessionRenamePayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => {
            state
                .outbound
                .send_frame(session_error_frame(frame.id, &CoreError::InvalidInput("missing payload".to_string())));
            return;
        }
    };
    let id = match parse_session_id(&payload.session_id) {
        Ok(id) => id,
        Err(e) => {
            state.outbound.send_frame(session_error_frame(frame.id, &e));
            return;
        }
    };
    match state.app.sessions.rename(id, &payload.name).await {
        Ok(view) => {
            state
                .outbound
                .send_frame(OutFrame::reply("session.renamed", frame.id.clone(), view.clone()).to_text());
            broadcast_other(state, "session.renamed", view);
        }
        Err(e) => state.outbound.send_frame(session_error_frame(frame.id, &e)),
    }
}

async fn handle_session_move(state: &mut ConnState, frame: Frame) {
    let payload: SessionMovePayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => {
            state
                .outbound
                .send_frame(error_frame(frame.id, "missing payload"));
            return;
        }
    };
    let id = match parse_session_id(&payload.session_id) {
        Ok(id) => id,
        Err(e) => {
            state.outbound.send_frame(error_frame(frame.id, &e.to_string()));
            return;
        }
    };
    match state.app.sessions.move_session(id, payload.category_id).await {
        Ok(view) => {
            state
                .outbound
                .send_frame(OutFrame::reply("session.moved", frame.id.clone(), view.clone()).to_text());
            broadcast_other(state, "session.moved", view);
        }
        Err(e) => state.outbound.send_frame(error_frame(frame.id, &e.to_string())),
    }
}

// ---- terminal.* handlers ----

async fn handle_terminal_data(state: &mut ConnState, frame: Frame) {
    let payload: TerminalDataPayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => {
            state.outbound.send_frame(error_frame(frame.id, "missing payload"));
            return;
        }
    };
    let id = match parse_session_id(&payload.session_id) {
        Ok(id) => id,
        Err(e) => {
            state.outbound.send_frame(error_frame(frame.id, &e.to_string()));
            return;
        }
    };
    if state.attached != Some(id) {
        state
            .outbound
            .send_frame(error_frame(frame.id, "not attached to this session"));
        return;
    }
    if let Err(e) = state.app.sessions.write(id, payload.data.as_bytes()).await {
        state.outbound.send_frame(error_frame(frame.id, &e.to_string()));
    }
}

async fn handle_terminal_resize(state: &mut ConnState, frame: Frame) {
    let payload: TerminalResizePayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => return,
    };
    let id = match parse_session_id(&payload.session_id) {
        Ok(id) => id,
        Err(_) => return,
    };
    if state.attached != Some(id) {
        return;
    }
    if let Err(e) = state.app.sessions.resize(id, payload.cols, payload.rows).await {
        state.outbound.send_frame(error_frame(frame.id, &e.to_string()));
    }
}

// ---- category.* handlers ----

async fn handle_category_list(state: &mut ConnState, id: Option<String>) {
    match state.app.categories.list().await {
        Ok(cats) => state.outbound.send_frame(OutFrame::reply("category.list", id, cats).to_text()),
        Err(e) => state.outbound.send_frame(error_frame(id, &e.to_string())),
    }
}

async fn handle_category_create(state: &mut ConnState, frame: Frame) {
    let payload: CategoryCreatePayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => {
            state.outbound.send_frame(error_frame(frame.id, "missing payload"));
            return;
        }
    };
    match state
        .app
        .categories
        .create(&payload.name, Some(state.principal.user_id.clone()))
        .await
    {
        Ok(cat) => {
            state
                .outbound
                .send_frame(OutFrame::reply("category.created", frame.id.clone(), cat.clone()).to_text());
            broadcast_other(state, "category.created", cat);
        }
        Err(e) => state.outbound.send_frame(error_frame(frame.id, &e.to_string())),
    }
}

async fn handle_category_rename(state: &mut ConnState, frame: Frame) {
    let payload: CategoryRenamePayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => {
            state.outbound.send_frame(error_frame(frame.id, "missing payload"));
            return;
        }
    };
    match state.app.categories.rename(&payload.category_id, &payload.name).await {
        Ok(cat) => {
            state
                .outbound
                .send_frame(OutFrame::reply("category.renamed", frame.id.clone(), cat.clone()).to_text());
            broadcast_other(state, "category.renamed", cat);
        }
        Err(e) => state.outbound.send_frame(error_frame(frame.id, &e.to_string())),
    }
}

async fn handle_category_delete(state: &mut ConnState, frame: Frame) {
    let payload: CategoryIdPayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => {
            state.outbound.send_frame(error_frame(frame.id, "missing payload"));
            return;
        }
    };
    match state.app.categories.delete(&payload.category_id).await {
        Ok(()) => {
            let out = CategoryIdOut { category_id: payload.category_id };
            state
                .outbound
                .send_frame(OutFrame::reply("category.deleted", frame.id.clone(), out.clone()).to_text());
            broadcast_other(state, "category.deleted", out);
        }
        Err(e) => state.outbound.send_frame(error_frame(frame.id, &e.to_string())),
    }
}

async fn handle_category_reorder(state: &mut ConnState, frame: Frame) {
    let payload: CategoryReorderPayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => {
            state.outbound.send_frame(error_frame(frame.id, "missing payload"));
            return;
        }
    };
    match state.app.categories.reorder(&payload.ordered_ids).await {
        Ok(()) => {
            let out = CategoryReorderOut { ordered_ids: payload.ordered_ids };
            state
                .outbound
                .send_frame(OutFrame::reply("category.reordered", frame.id.clone(), out.clone()).to_text());
            broadcast_other(state, "category.reordered", out);
        }
        Err(e) => state.outbound.send_frame(error_frame(frame.id, &e.to_string())),
    }
}

async fn handle_category_toggle(state: &mut ConnState, frame: Frame) {
    let payload: CategoryTogglePayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => {
            state.outbound.send_frame(error_frame(frame.id, "missing payload"));
            return;
        }
    };
    match state.app.categories.toggle(&payload.category_id, payload.collapsed).await {
        Ok(cat) => {
            state
                .outbound
                .send_frame(OutFrame::reply("category.toggled", frame.id.clone(), cat.clone()).to_text());
            broadcast_other(state, "category.toggled", cat);
        }
        Err(e) => state.outbound.send_frame(error_frame(frame.id, &e.to_string())),
    }
}

// ---- notification.* handlers ----

async fn handle_preferences_get(state: &mut ConnState, id: Option<String>) {
    match state.app.categories.get_preferences(&state.principal.user_id).await {
        Ok(prefs) => {
            *state.prefs.lock().expect("poisoned") = prefs.clone();
            state
                .outbound
                .send_frame(OutFrame::reply("notification.preferences", id, prefs).to_text());
        }
        Err(e) => state.outbound.send_frame(error_frame(id, &e.to_string())),
    }
}

async fn handle_preferences_set(state: &mut ConnState, frame: Frame) {
    let payload: NotificationPreferencesSetPayload = frame
        .payload
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    match state
        .app
        .categories
        .set_preferences(
            &state.principal.user_id,
            payload.browser_enabled,
            payload.visual_enabled,
            payload.notify_on_input,
            payload.notify_on_completed,
        )
        .await
    {
        Ok(prefs) => {
            *state.prefs.lock().expect("poisoned") = prefs.clone();
            state
                .outbound
                .send_frame(OutFrame::reply("notification.preferences.updated", frame.id, prefs).to_text());
        }
        Err(e) => state.outbound.send_frame(error_frame(frame.id, &e.to_string())),
    }
}

async fn handle_notification_dismiss(state: &mut ConnState, frame: Frame) {
    let payload: SessionIdPayload = match frame.payload.and_then(|v| serde_json::from_value(v).ok()) {
        Some(p) => p,
        None => return,
    };
    state.app.notifications.clear_for_session(&payload.session_id);
}

fn broadcast_other<T: Serialize>(state: &ConnState, ty: &'static str, payload: T) {
    let text = OutFrame::event(ty, payload).to_text();
    state.app.connections.broadcast_text(&text, Some(state.client_id));
}

// ---- wire output shapes ----

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct AuthSuccessOut {
    user_id: String,
    login_name: String,
    display_name: String,
}

#[derive(Serialize)]
struct ErrorOut {
    message: String,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct SessionIdOut {
    session_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionAttachedOut {
    session: SessionView,
    scrollback: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TerminalDataOut {
    session_id: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TerminalExitOut {
    session_id: String,
    exit_code: u32,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct CategoryIdOut {
    category_id: String,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct CategoryReorderOut {
    ordered_ids: Vec<String>,
}
