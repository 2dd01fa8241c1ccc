//! The Session Manager itself: public contract over session
//! lifecycle, fan-out, quotas, and idle reaping. Owns every live PTY, ring,
//! and attached-client set; the Metadata Store is its durable projection.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::blocking;
use crate::error::{CoreError, CoreResult};
use crate::persistence::{self, PersistenceBackend};
use crate::pty::{self, PtyHandle};
use crate::scrollback::ScrollbackRing;
use crate::store::{now_unix, SessionRecord, Store};
use crate::subscription::Subscription;
use crate::validate;

use super::types::{ClientId, CreateOptions, SessionId, SessionView};

const DEBOUNCE_SECS: u64 = 5;
const IDLE_REAP_INTERVAL: Duration = Duration::from_secs(60);

type DataCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;
type ExitCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Live, in-memory half of a session. The durable half lives in `Store`.
struct SessionInner {
    id: SessionId,
    pty: PtyHandle,
    ring: Mutex<ScrollbackRing>,
    data_subs: Mutex<HashMap<u64, DataCallback>>,
    exit_subs: Mutex<HashMap<u64, ExitCallback>>,
    next_sub_id: AtomicU64,
    attached_clients: Mutex<HashSet<ClientId>>,
    dims: Mutex<(u16, u16)>,
    mux_handle: Option<String>,
    last_touch: Mutex<Instant>,
    empty_since: Mutex<Option<Instant>>,
    /// Guards terminate-vs-PTY-exit racing each other into double teardown.
    terminated: AtomicBool,
}

impl SessionInner {
    fn new(
        id: SessionId,
        pty: PtyHandle,
        ring: ScrollbackRing,
        cols: u16,
        rows: u16,
        mux_handle: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            pty,
            ring: Mutex::new(ring),
            data_subs: Mutex::new(HashMap::new()),
            exit_subs: Mutex::new(HashMap::new()),
            next_sub_id: AtomicU64::new(1),
            attached_clients: Mutex::new(HashSet::new()),
            dims: Mutex::new((cols, rows)),
            mux_handle,
            last_touch: Mutex::new(Instant::now() - Duration::from_secs(DEBOUNCE_SECS)),
            empty_since: Mutex::new(Some(Instant::now())),
            terminated: AtomicBool::new(false),
        })
    }

    /// `true` the first time it's called — that caller now owns teardown.
    fn mark_terminated(&self) -> bool {
        self.terminated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

fn fan_out_data(inner: &SessionInner, data: &[u8]) {
    let subs: Vec<DataCallback> = inner.data_subs.lock().expect("poisoned").values().cloned().collect();
    for cb in subs {
        let chunk = data.to_vec();
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(&chunk))).is_err() {
            warn!(event = "session.fanout.data.panicked", session_id = %inner.id);
        }
    }
}

fn fan_out_exit(inner: &SessionInner, code: u32) {
    let subs: Vec<ExitCallback> = inner.exit_subs.lock().expect("poisoned").values().cloned().collect();
    for cb in subs {
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(code))).is_err() {
            warn!(event = "session.fanout.exit.panicked", session_id = %inner.id);
        }
    }
}

pub struct SessionManager {
    store: Arc<Store>,
    backend: PersistenceBackend,
    scrollback_capacity: usize,
    max_sessions: usize,
    idle_timeout: Option<Duration>,
    sessions: Arc<DashMap<SessionId, Arc<SessionInner>>>,
    next_client_id: AtomicU64,
}

impl SessionManager {
    pub fn new(
        store: Arc<Store>,
        scrollback_capacity: usize,
        max_sessions: usize,
        idle_timeout_minutes: u64,
    ) -> Self {
        let backend = PersistenceBackend::detect();
        info!(event = "session_manager.backend.selected", backend = ?backend);
        Self {
            store,
            backend,
            scrollback_capacity,
            max_sessions,
            idle_timeout: if idle_timeout_minutes == 0 {
                None
            } else {
                Some(Duration::from_secs(idle_timeout_minutes * 60))
            },
            sessions: Arc::new(DashMap::new()),
            next_client_id: AtomicU64::new(1),
        }
    }

    pub fn next_client_id(&self) -> ClientId {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn persistence_backend(&self) -> PersistenceBackend {
        self.backend
    }

    async fn with_store<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Store) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        blocking::run(&self.store, f).await
    }

    /// Order of effects is load-bearing: allocate ID, spawn PTY,
    /// optionally create the mux handle, wire the ring/callbacks, *then*
    /// durably insert. A failed insert rolls back everything spawned so far
    /// before the error reaches the caller.
    pub async fn create(&self, opts: CreateOptions) -> CoreResult<SessionView> {
        let name = match &opts.name {
            Some(n) => validate::validate_name(n)?,
            None => "Session".to_string(),
        };
        let (default_shell, default_argv) = pty::default_shell();
        let shell = match &opts.shell {
            Some(s) => {
                validate::validate_shell(s)?;
                s.clone()
            }
            None => default_shell,
        };
        let argv = if opts.shell.is_some() { Vec::new() } else { default_argv };
        if let Some(cwd) = &opts.cwd {
            validate::validate_cwd(cwd)?;
        }
        let cols = validate::validate_dim(opts.cols.unwrap_or(80), "cols")?;
        let rows = validate::validate_dim(opts.rows.unwrap_or(24), "rows")?;

        let non_terminated = self.with_store(|s| s.count_non_terminated()).await?;
        if non_terminated >= self.max_sessions {
            return Err(CoreError::QuotaExceeded(self.max_sessions));
        }

        let id = SessionId::new();
        let cwd_path = opts.cwd.as_ref().map(PathBuf::from);
        let mux_handle = (self.backend == PersistenceBackend::TmuxMultiplexer)
            .then(|| persistence::tmux_handle_name(&id.to_string()));
        let spawn_opts = pty::SpawnOptions {
            shell: shell.clone(),
            argv,
            cwd: cwd_path.clone(),
            cols,
            rows,
            env: opts.env.clone(),
            session_id: id.to_string(),
            tmux_handle: mux_handle.clone(),
        };
        let (handle, data_rx, exit_rx) = pty::spawn(spawn_opts)?;

        let ring = ScrollbackRing::new(self.scrollback_capacity);
        let inner = SessionInner::new(id, handle, ring, cols, rows, mux_handle.clone());
        self.spawn_pty_pumps(Arc::clone(&inner), data_rx, exit_rx);

        let now = now_unix();
        let sort_order = self.with_store(|s| s.next_sort_order_for_category(None)).await?;
        let record = SessionRecord {
            id: id.to_string(),
            name,
            shell,
            cwd: opts.cwd.clone().unwrap_or_default(),
            created_at: now,
            last_accessed_at: now,
            owner_id: opts.owner.clone(),
            status: "active".to_string(),
            cols: cols as u32,
            rows: rows as u32,
            external_mux_handle: mux_handle.clone(),
            category_id: None,
            sort_order,
        };

        let insert_result = self
            .with_store({
                let record = record.clone();
                move |s| s.insert_session(&record)
            })
            .await;
        if let Err(e) = insert_result {
            inner.pty.kill();
            if let Some(h) = &mux_handle {
                let _ = persistence::tmux_kill_session(h);
            }
            return Err(e);
        }
        let _ = self
            .with_store(move |s| s.append_log(&id.to_string(), "create", None, now))
            .await;

        self.sessions.insert(id, inner);
        info!(event = "session.create.completed", session_id = %id);
        Ok(SessionView::from_record(record, true))
    }

    /// Spawns the two background pumps every session needs: one draining
    /// PTY output into the ring plus fan-out, one waiting for PTY exit to
    /// run the same teardown `terminate` would, since a session is also
    /// terminated by its shell process exiting on its own.
    fn spawn_pty_pumps(
        &self,
        inner: Arc<SessionInner>,
        mut data_rx: mpsc::Receiver<Vec<u8>>,
        mut exit_rx: mpsc::Receiver<u32>,
    ) {
        let store = Arc::clone(&self.store);
        let backend = self.backend;
        let id = inner.id;
        let sessions = Arc::clone(&self.sessions);

        let data_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(chunk) = data_rx.recv().await {
                data_inner.ring.lock().expect("poisoned").append(&chunk);
                fan_out_data(&data_inner, &chunk);
            }
        });

        tokio::spawn(async move {
            if let Some(code) = exit_rx.recv().await {
                let Some((_, inner)) = sessions.remove(&id) else {
                    return;
                };
                if !inner.mark_terminated() {
                    return;
                }
                fan_out_exit(&inner, code);
                if backend == PersistenceBackend::StoredScrollback {
                    let content = inner.ring.lock().expect("poisoned").joined();
                    let idstr = id.to_string();
                    let _ = blocking::run(&store, move |s| s.save_scrollback(&idstr, &content, now_unix())).await;
                }
                let idstr = id.to_string();
                let _ = blocking::run(&store, move |s| {
                    s.update_status(&idstr, "terminated")?;
                    s.append_log(&idstr, "exit", Some(&code.to_string()), now_unix())
                })
                .await;
                info!(event = "session.pty.exited", session_id = %id, exit_code = code);
            }
        });
    }

    pub async fn get(&self, id: SessionId) -> CoreResult<SessionView> {
        let idstr = id.to_string();
        let record = self
            .with_store(move |s| {
                s.get_session(&idstr)?
                    .ok_or_else(|| CoreError::NotFound("Session not found".to_string()))
            })
            .await?;
        let attachable = self.sessions.contains_key(&id);
        Ok(SessionView::from_record(record, attachable))
    }

    /// Merges durable records with an `attachable` flag set iff a live
    /// in-memory session exists for that id at the moment of the call.
    pub async fn list(&self) -> CoreResult<Vec<SessionView>> {
        let records = self.with_store(|s| s.list_sessions()).await?;
        Ok(records
            .into_iter()
            .map(|r| {
                let attachable = SessionId::parse(&r.id)
                    .map(|id| self.sessions.contains_key(&id))
                    .unwrap_or(false);
                SessionView::from_record(r, attachable)
            })
            .collect())
    }

    pub async fn write(&self, id: SessionId, bytes: &[u8]) -> CoreResult<()> {
        let inner = self.live(id)?;
        inner.pty.write(bytes);
        let due = {
            let mut last = inner.last_touch.lock().expect("poisoned");
            if last.elapsed() >= Duration::from_secs(DEBOUNCE_SECS) {
                *last = Instant::now();
                true
            } else {
                false
            }
        };
        if due {
            let idstr = id.to_string();
            let _ = self.with_store(move |s| s.touch_active(&idstr, now_unix())).await;
        }
        Ok(())
    }

    pub async fn resize(&self, id: SessionId, cols: i64, rows: i64) -> CoreResult<()> {
        let cols = validate::validate_dim(cols, "cols")?;
        let rows = validate::validate_dim(rows, "rows")?;
        let inner = self.live(id)?;
        inner.pty.resize(cols, rows);
        *inner.dims.lock().expect("poisoned") = (cols, rows);
        let idstr = id.to_string();
        self.with_store(move |s| s.update_dimensions(&idstr, cols as u32, rows as u32))
            .await
    }

    pub async fn rename(&self, id: SessionId, name: &str) -> CoreResult<SessionView> {
        let name = validate::validate_name(name)?;
        self.with_store({
            let name = name.clone();
            let idstr = id.to_string();
            move |s| {
                s.get_session(&idstr)?
                    .ok_or_else(|| CoreError::NotFound("Session not found".to_string()))?;
                s.rename_session(&idstr, &name)?;
                s.append_log(&idstr, "rename", Some(&name), now_unix())
            }
        })
        .await?;
        self.get(id).await
    }

    pub async fn move_session(&self, id: SessionId, category_id: Option<String>) -> CoreResult<SessionView> {
        if let Some(cat) = &category_id {
            let cat = cat.clone();
            let exists = self.with_store(move |s| Ok(s.get_category(&cat)?.is_some())).await?;
            if !exists {
                return Err(CoreError::NotFound("Category not found".to_string()));
            }
        }
        self.with_store({
            let idstr = id.to_string();
            let category_id = category_id.clone();
            move |s| {
                s.get_session(&idstr)?
                    .ok_or_else(|| CoreError::NotFound("Session not found".to_string()))?;
                s.move_session(&idstr, category_id.as_deref())?;
                s.append_log(&idstr, "move", category_id.as_deref(), now_unix())
            }
        })
        .await?;
        self.get(id).await
    }

    /// Returns `false` for an unknown *or already-terminated* id, kept
    /// idempotent so optimistic-cleanup callers can call this freely during
    /// races without checking first.
    pub async fn terminate(&self, id: SessionId) -> CoreResult<bool> {
        let Some((_, inner)) = self.sessions.remove(&id) else {
            return Ok(false);
        };
        if !inner.mark_terminated() {
            return Ok(false);
        }
        if self.backend == PersistenceBackend::StoredScrollback {
            let content = inner.ring.lock().expect("poisoned").joined();
            let idstr = id.to_string();
            let _ = self.with_store(move |s| s.save_scrollback(&idstr, &content, now_unix())).await;
        }
        if let Some(handle) = &inner.mux_handle {
            let _ = persistence::tmux_kill_session(handle);
        }
        inner.pty.kill();
        self.with_store({
            let idstr = id.to_string();
            move |s| {
                s.update_status(&idstr, "terminated")?;
                s.append_log(&idstr, "terminate", None, now_unix())
            }
        })
        .await?;
        info!(event = "session.terminate.completed", session_id = %id);
        Ok(true)
    }

    pub async fn delete(&self, id: SessionId) -> CoreResult<()> {
        let _ = self.terminate(id).await?;
        let idstr = id.to_string();
        self.with_store(move |s| s.delete_session(&idstr)).await
    }

    pub fn subscribe_data(
        &self,
        id: SessionId,
        callback: impl Fn(&[u8]) + Send + Sync + 'static,
    ) -> CoreResult<Subscription> {
        let inner = self.live(id)?;
        let sub_id = inner.next_sub_id.fetch_add(1, Ordering::Relaxed);
        inner.data_subs.lock().expect("poisoned").insert(sub_id, Arc::new(callback));
        let weak = Arc::downgrade(&inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.data_subs.lock().expect("poisoned").remove(&sub_id);
            }
        }))
    }

    pub fn subscribe_exit(
        &self,
        id: SessionId,
        callback: impl Fn(u32) + Send + Sync + 'static,
    ) -> CoreResult<Subscription> {
        let inner = self.live(id)?;
        let sub_id = inner.next_sub_id.fetch_add(1, Ordering::Relaxed);
        inner.exit_subs.lock().expect("poisoned").insert(sub_id, Arc::new(callback));
        let weak = Arc::downgrade(&inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.exit_subs.lock().expect("poisoned").remove(&sub_id);
            }
        }))
    }

    pub async fn attach_client(&self, id: SessionId, client_id: ClientId) -> CoreResult<()> {
        let inner = self.live(id)?;
        let became_active = {
            let mut clients = inner.attached_clients.lock().expect("poisoned");
            let was_empty = clients.is_empty();
            clients.insert(client_id);
            *inner.empty_since.lock().expect("poisoned") = None;
            was_empty
        };
        let idstr = id.to_string();
        if became_active {
            self.with_store(move |s| {
                s.update_status(&idstr, "active")?;
                s.append_log(&idstr, "attach-client", None, now_unix())
            })
            .await
        } else {
            self.with_store(move |s| s.append_log(&idstr, "attach-client", None, now_unix()))
                .await
        }
    }

    pub async fn detach_client(&self, id: SessionId, client_id: ClientId) -> CoreResult<()> {
        let Some(inner) = self.try_live(id) else {
            return Ok(());
        };
        let became_idle = {
            let mut clients = inner.attached_clients.lock().expect("poisoned");
            clients.remove(&client_id);
            let now_empty = clients.is_empty();
            if now_empty {
                *inner.empty_since.lock().expect("poisoned") = Some(Instant::now());
            }
            now_empty
        };
        let idstr = id.to_string();
        if became_idle {
            self.with_store(move |s| {
                s.update_status(&idstr, "idle")?;
                s.append_log(&idstr, "detach-client", None, now_unix())
            })
            .await
        } else {
            self.with_store(move |s| s.append_log(&idstr, "detach-client", None, now_unix()))
                .await
        }
    }

    pub async fn get_scrollback(&self, id: SessionId) -> CoreResult<String> {
        if let Some(inner) = self.try_live(id) {
            return Ok(inner.ring.lock().expect("poisoned").joined());
        }
        let idstr = id.to_string();
        let content = self.with_store(move |s| s.get_scrollback(&idstr)).await?;
        Ok(content.unwrap_or_default())
    }

    fn try_live(&self, id: SessionId) -> Option<Arc<SessionInner>> {
        self.sessions.get(&id).map(|r| Arc::clone(r.value()))
    }

    fn live(&self, id: SessionId) -> CoreResult<Arc<SessionInner>> {
        self.try_live(id)
            .ok_or_else(|| CoreError::NotFound("Session not found".to_string()))
    }

    /// Spawns the 60s idle-reaping task. Takes `Arc<Self>` since
    /// the task outlives the call that starts it.
    pub fn spawn_idle_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(IDLE_REAP_INTERVAL);
            loop {
                interval.tick().await;
                let Some(timeout) = manager.idle_timeout else {
                    continue;
                };
                let stale: Vec<SessionId> = manager
                    .sessions
                    .iter()
                    .filter_map(|entry| {
                        let empty_since = *entry.value().empty_since.lock().expect("poisoned");
                        match empty_since {
                            Some(since) if since.elapsed() >= timeout => Some(*entry.key()),
                            _ => None,
                        }
                    })
                    .collect();
                for id in stale {
                    info!(event = "session.idle_reap.terminating", session_id = %id);
                    let _ = manager.terminate(id).await;
                }
            }
        })
    }

    /// Graceful shutdown: flushes scrollback for the fallback backend,
    /// marks every live session idle (not terminated, so a
    /// tmux-backed session can be reattached after restart), then kills the
    /// PTYs that have no external multiplexer handle.
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| *e.key()).collect();
        for id in ids {
            let Some(inner) = self.try_live(id) else { continue };
            if self.backend == PersistenceBackend::StoredScrollback {
                let content = inner.ring.lock().expect("poisoned").joined();
                let idstr = id.to_string();
                let _ = self.with_store(move |s| s.save_scrollback(&idstr, &content, now_unix())).await;
            }
            let idstr = id.to_string();
            let _ = self.with_store(move |s| s.update_status(&idstr, "idle")).await;
            if inner.mux_handle.is_none() {
                inner.pty.kill();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, timeout};

    fn manager_with(max_sessions: usize) -> SessionManager {
        let store = Arc::new(Store::open_in_memory().unwrap());
        SessionManager::new(store, 10_000, max_sessions, 0)
    }

    fn sh_opts(name: &str) -> CreateOptions {
        CreateOptions {
            name: Some(name.to_string()),
            shell: Some("/bin/sh".to_string()),
            cwd: None,
            cols: Some(80),
            rows: Some(24),
            owner: None,
            env: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_and_is_attachable() {
        let manager = manager_with(5);
        let view = manager.create(sh_opts("T")).await.unwrap();
        assert!(view.attachable);
        let fetched = manager.get(SessionId::parse(&view.id).unwrap()).await.unwrap();
        assert_eq!(fetched.id, view.id);
        assert!(fetched.attachable);
    }

    #[tokio::test]
    async fn quota_exceeded_on_second_session() {
        let manager = manager_with(1);
        manager.create(sh_opts("first")).await.unwrap();
        let err = manager.create(sh_opts("second")).await.unwrap_err();
        match err {
            CoreError::QuotaExceeded(n) => assert_eq!(n, 1),
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_rejects_out_of_range_dimensions_instead_of_wrapping() {
        let manager = manager_with(5);
        let mut opts = sh_opts("T");
        opts.cols = Some(65537); // wraps to 1 under a naive `as u16` cast
        let err = manager.create(opts).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        assert!(manager.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn terminate_is_false_for_unknown_and_for_second_call() {
        let manager = manager_with(5);
        let view = manager.create(sh_opts("T")).await.unwrap();
        let id = SessionId::parse(&view.id).unwrap();
        assert!(manager.terminate(id).await.unwrap());
        assert!(!manager.terminate(id).await.unwrap());
        assert!(!manager.terminate(SessionId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn rename_is_idempotent() {
        let manager = manager_with(5);
        let view = manager.create(sh_opts("T")).await.unwrap();
        let id = SessionId::parse(&view.id).unwrap();
        manager.rename(id, "renamed").await.unwrap();
        let second = manager.rename(id, "renamed").await.unwrap();
        assert_eq!(second.name, "renamed");
    }

    #[tokio::test]
    async fn move_to_unknown_category_is_not_found_and_leaves_category_unchanged() {
        let manager = manager_with(5);
        let view = manager.create(sh_opts("T")).await.unwrap();
        let id = SessionId::parse(&view.id).unwrap();
        let err = manager
            .move_session(id, Some("does-not-exist".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        let after = manager.get(id).await.unwrap();
        assert_eq!(after.category_id, None);
    }

    #[tokio::test]
    async fn attach_then_detach_transitions_status() {
        let manager = manager_with(5);
        let view = manager.create(sh_opts("T")).await.unwrap();
        let id = SessionId::parse(&view.id).unwrap();
        manager.attach_client(id, 1).await.unwrap();
        assert_eq!(manager.get(id).await.unwrap().status, "active");
        manager.detach_client(id, 1).await.unwrap();
        assert_eq!(manager.get(id).await.unwrap().status, "idle");
    }

    #[tokio::test]
    async fn delete_removes_from_list_and_scrollback() {
        let manager = manager_with(5);
        let view = manager.create(sh_opts("T")).await.unwrap();
        let id = SessionId::parse(&view.id).unwrap();
        manager.delete(id).await.unwrap();
        assert!(manager.get(id).await.is_err());
        let list = manager.list().await.unwrap();
        assert!(!list.iter().any(|s| s.id == view.id));
    }

    #[tokio::test]
    async fn subscribe_data_receives_pty_echo() {
        let manager = manager_with(5);
        let view = manager.create(sh_opts("T")).await.unwrap();
        let id = SessionId::parse(&view.id).unwrap();

        let received = Arc::new(Mutex::new(Vec::<u8>::new()));
        let received2 = Arc::clone(&received);
        let _sub = manager
            .subscribe_data(id, move |chunk| {
                received2.lock().unwrap().extend_from_slice(chunk);
            })
            .unwrap();

        manager.write(id, b"echo hi\n").await.unwrap();

        let saw_hi = timeout(Duration::from_secs(5), async {
            loop {
                if String::from_utf8_lossy(&received.lock().unwrap()).contains("hi") {
                    return;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(saw_hi.is_ok(), "expected PTY echo to contain \"hi\"");
    }

    #[tokio::test]
    async fn cancelling_subscription_stops_fanout() {
        let manager = manager_with(5);
        let view = manager.create(sh_opts("T")).await.unwrap();
        let id = SessionId::parse(&view.id).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let sub = manager
            .subscribe_data(id, move |_| {
                count2.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        sub.cancel();

        manager.write(id, b"echo hi\n").await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
