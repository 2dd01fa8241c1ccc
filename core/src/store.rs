//! Durable metadata store: sessions, categories, stored scrollback, the
//! event log, and per-user notification preferences, all behind a single
//! `rusqlite::Connection` in WAL mode with `foreign_keys` on.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CoreError, CoreResult};

const MIGRATION_NAME: &str = "0001_initial";

/// Durable projection of a session row. The in-memory `Session` held by the
/// Session Manager is a transient view over this record plus live PTY state.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub name: String,
    pub shell: String,
    pub cwd: String,
    pub created_at: i64,
    pub last_accessed_at: i64,
    pub owner_id: Option<String>,
    pub status: String,
    pub cols: u32,
    pub rows: u32,
    pub external_mux_handle: Option<String>,
    pub category_id: Option<String>,
    pub sort_order: i64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
    pub sort_order: i64,
    pub collapsed: bool,
    pub owner_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub user_id: String,
    pub browser_enabled: bool,
    pub visual_enabled: bool,
    pub notify_on_input: bool,
    pub notify_on_completed: bool,
    pub updated_at: i64,
}

impl NotificationPreferences {
    fn defaults(user_id: &str, now: i64) -> Self {
        Self {
            user_id: user_id.to_string(),
            browser_enabled: true,
            visual_enabled: true,
            notify_on_input: true,
            notify_on_completed: true,
            updated_at: now,
        }
    }
}

/// Single-connection durable store. Callers on the async side dispatch
/// through `tokio::task::spawn_blocking`; this type itself is plain
/// synchronous rusqlite code guarded by a mutex.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store for tests; skips the file-backed pragmas that require
    /// a real file but keeps foreign_keys on.
    #[cfg(test)]
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> rusqlite::Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id                  TEXT PRIMARY KEY,
                name                TEXT NOT NULL,
                shell               TEXT NOT NULL,
                cwd                 TEXT NOT NULL,
                created_at          INTEGER NOT NULL,
                last_accessed_at    INTEGER NOT NULL,
                owner_id            TEXT,
                status              TEXT NOT NULL,
                cols                INTEGER NOT NULL,
                rows                INTEGER NOT NULL,
                external_mux_handle TEXT,
                category_id         TEXT REFERENCES categories(id),
                sort_order          INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS categories (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                sort_order  INTEGER NOT NULL,
                collapsed   INTEGER NOT NULL DEFAULT 0,
                owner_id    TEXT,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scrollback (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT NOT NULL UNIQUE REFERENCES sessions(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS session_logs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                event_type  TEXT NOT NULL,
                details     TEXT,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notification_preferences (
                user_id              TEXT PRIMARY KEY,
                browser_enabled      INTEGER NOT NULL,
                visual_enabled       INTEGER NOT NULL,
                notify_on_input      INTEGER NOT NULL,
                notify_on_completed  INTEGER NOT NULL,
                updated_at           INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS migrations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                applied_at  INTEGER NOT NULL
            );
            ",
        )?;
        let now = now_unix();
        conn.execute(
            "INSERT OR IGNORE INTO migrations (name, applied_at) VALUES (?1, ?2)",
            params![MIGRATION_NAME, now],
        )?;
        Ok(())
    }

    // ---- sessions ----

    pub fn insert_session(&self, record: &SessionRecord) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached(
            "INSERT INTO sessions (id, name, shell, cwd, created_at, last_accessed_at,
                owner_id, status, cols, rows, external_mux_handle, category_id, sort_order)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
        )?
        .execute(params![
            record.id,
            record.name,
            record.shell,
            record.cwd,
            record.created_at,
            record.last_accessed_at,
            record.owner_id,
            record.status,
            record.cols,
            record.rows,
            record.external_mux_handle,
            record.category_id,
            record.sort_order,
        ])?;
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> CoreResult<Option<SessionRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let row = conn
            .prepare_cached(
                "SELECT id, name, shell, cwd, created_at, last_accessed_at, owner_id,
                        status, cols, rows, external_mux_handle, category_id, sort_order
                 FROM sessions WHERE id = ?1",
            )?
            .query_row(params![id], row_to_session)
            .optional()?;
        Ok(row)
    }

    pub fn list_sessions(&self) -> CoreResult<Vec<SessionRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, shell, cwd, created_at, last_accessed_at, owner_id,
                    status, cols, rows, external_mux_handle, category_id, sort_order
             FROM sessions ORDER BY category_id, sort_order",
        )?;
        let rows = stmt
            .query_map([], row_to_session)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_non_terminated(&self) -> CoreResult<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let n: i64 = conn.prepare_cached(
            "SELECT COUNT(*) FROM sessions WHERE status != 'terminated'",
        )?
        .query_row([], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn update_status(&self, id: &str, status: &str) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached("UPDATE sessions SET status = ?2 WHERE id = ?1")?
            .execute(params![id, status])?;
        Ok(())
    }

    pub fn update_last_accessed(&self, id: &str, ts: i64) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached("UPDATE sessions SET last_accessed_at = ?2 WHERE id = ?1")?
            .execute(params![id, ts])?;
        Ok(())
    }

    /// Debounced write-path touch: bumps `last_accessed_at`
    /// and marks the session active in one statement, skipped for sessions
    /// already terminated (a late debounce flush racing a concurrent delete).
    pub fn touch_active(&self, id: &str, ts: i64) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached(
            "UPDATE sessions SET last_accessed_at = ?2, status = 'active'
             WHERE id = ?1 AND status != 'terminated'",
        )?
        .execute(params![id, ts])?;
        Ok(())
    }

    pub fn update_dimensions(&self, id: &str, cols: u32, rows: u32) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached("UPDATE sessions SET cols = ?2, rows = ?3 WHERE id = ?1")?
            .execute(params![id, cols, rows])?;
        Ok(())
    }

    pub fn rename_session(&self, id: &str, name: &str) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached("UPDATE sessions SET name = ?2 WHERE id = ?1")?
            .execute(params![id, name])?;
        Ok(())
    }

    /// Moves a session to `category_id` (or uncategorized, if `None`), placing
    /// it at the end of the target category. Runs inside a transaction since
    /// it reads max(sort_order) then writes.
    pub fn move_session(&self, id: &str, category_id: Option<&str>) -> CoreResult<()> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;
        let next_sort_order: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM sessions WHERE category_id IS ?1",
                params![category_id],
                |r| r.get(0),
            )?;
        tx.execute(
            "UPDATE sessions SET category_id = ?2, sort_order = ?3 WHERE id = ?1",
            params![id, category_id, next_sort_order],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn set_external_mux_handle(&self, id: &str, handle: Option<&str>) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached("UPDATE sessions SET external_mux_handle = ?2 WHERE id = ?1")?
            .execute(params![id, handle])?;
        Ok(())
    }

    pub fn next_sort_order_for_category(&self, category_id: Option<&str>) -> CoreResult<i64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let n: i64 = conn
            .prepare_cached(
                "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM sessions WHERE category_id IS ?1",
            )?
            .query_row(params![category_id], |r| r.get(0))?;
        Ok(n)
    }

    pub fn delete_session(&self, id: &str) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached("DELETE FROM sessions WHERE id = ?1")?
            .execute(params![id])?;
        Ok(())
    }

    // ---- stored scrollback (fallback persistence backend) ----

    pub fn save_scrollback(&self, session_id: &str, content: &str, now: i64) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached(
            "INSERT INTO scrollback (session_id, content, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET content = excluded.content, created_at = excluded.created_at",
        )?
        .execute(params![session_id, content, now])?;
        Ok(())
    }

    pub fn get_scrollback(&self, session_id: &str) -> CoreResult<Option<String>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let content = conn
            .prepare_cached("SELECT content FROM scrollback WHERE session_id = ?1")?
            .query_row(params![session_id], |r| r.get(0))
            .optional()?;
        Ok(content)
    }

    // ---- event log ----

    pub fn append_log(
        &self,
        session_id: &str,
        event_type: &str,
        details: Option<&str>,
        now: i64,
    ) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached(
            "INSERT INTO session_logs (session_id, event_type, details, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?
        .execute(params![session_id, event_type, details, now])?;
        Ok(())
    }

    // ---- categories ----

    pub fn insert_category(&self, record: &CategoryRecord) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached(
            "INSERT INTO categories (id, name, sort_order, collapsed, owner_id, created_at)
             VALUES (?1,?2,?3,?4,?5,?6)",
        )?
        .execute(params![
            record.id,
            record.name,
            record.sort_order,
            record.collapsed,
            record.owner_id,
            record.created_at,
        ])?;
        Ok(())
    }

    pub fn get_category(&self, id: &str) -> CoreResult<Option<CategoryRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let row = conn
            .prepare_cached(
                "SELECT id, name, sort_order, collapsed, owner_id, created_at
                 FROM categories WHERE id = ?1",
            )?
            .query_row(params![id], row_to_category)
            .optional()?;
        Ok(row)
    }

    pub fn list_categories(&self) -> CoreResult<Vec<CategoryRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, sort_order, collapsed, owner_id, created_at
             FROM categories ORDER BY sort_order",
        )?;
        let rows = stmt
            .query_map([], row_to_category)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn next_category_sort_order(&self) -> CoreResult<i64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let n: i64 = conn
            .prepare_cached("SELECT COALESCE(MAX(sort_order), -1) + 1 FROM categories")?
            .query_row([], |r| r.get(0))?;
        Ok(n)
    }

    pub fn rename_category(&self, id: &str, name: &str) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached("UPDATE categories SET name = ?2 WHERE id = ?1")?
            .execute(params![id, name])?;
        Ok(())
    }

    pub fn set_category_collapsed(&self, id: &str, collapsed: bool) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached("UPDATE categories SET collapsed = ?2 WHERE id = ?1")?
            .execute(params![id, collapsed])?;
        Ok(())
    }

    /// Deletes a category and uncategorizes any sessions that referenced it,
    /// inside one transaction (deletion never cascades into sessions, §3).
    pub fn delete_category(&self, id: &str) -> CoreResult<()> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE sessions SET category_id = NULL WHERE category_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Reorders categories to match the given id sequence, inside one
    /// transaction.
    pub fn reorder_categories(&self, ordered_ids: &[String]) -> CoreResult<()> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;
        for (idx, id) in ordered_ids.iter().enumerate() {
            tx.execute(
                "UPDATE categories SET sort_order = ?2 WHERE id = ?1",
                params![id, idx as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ---- notification preferences ----

    pub fn get_preferences(&self, user_id: &str) -> CoreResult<NotificationPreferences> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let row = conn
            .prepare_cached(
                "SELECT user_id, browser_enabled, visual_enabled, notify_on_input,
                        notify_on_completed, updated_at
                 FROM notification_preferences WHERE user_id = ?1",
            )?
            .query_row(params![user_id], row_to_preferences)
            .optional()?;
        Ok(row.unwrap_or_else(|| NotificationPreferences::defaults(user_id, now_unix())))
    }

    pub fn upsert_preferences(&self, prefs: &NotificationPreferences) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.prepare_cached(
            "INSERT INTO notification_preferences
                (user_id, browser_enabled, visual_enabled, notify_on_input, notify_on_completed, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6)
             ON CONFLICT(user_id) DO UPDATE SET
                browser_enabled = excluded.browser_enabled,
                visual_enabled = excluded.visual_enabled,
                notify_on_input = excluded.notify_on_input,
                notify_on_completed = excluded.notify_on_completed,
                updated_at = excluded.updated_at",
        )?
        .execute(params![
            prefs.user_id,
            prefs.browser_enabled,
            prefs.visual_enabled,
            prefs.notify_on_input,
            prefs.notify_on_completed,
            prefs.updated_at,
        ])?;
        Ok(())
    }
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        shell: row.get(2)?,
        cwd: row.get(3)?,
        created_at: row.get(4)?,
        last_accessed_at: row.get(5)?,
        owner_id: row.get(6)?,
        status: row.get(7)?,
        cols: row.get(8)?,
        rows: row.get(9)?,
        external_mux_handle: row.get(10)?,
        category_id: row.get(11)?,
        sort_order: row.get(12)?,
    })
}

fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<CategoryRecord> {
    Ok(CategoryRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        sort_order: row.get(2)?,
        collapsed: row.get(3)?,
        owner_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_preferences(row: &rusqlite::Row) -> rusqlite::Result<NotificationPreferences> {
    Ok(NotificationPreferences {
        user_id: row.get(0)?,
        browser_enabled: row.get(1)?,
        visual_enabled: row.get(2)?,
        notify_on_input: row.get(3)?,
        notify_on_completed: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, sort_order: i64) -> SessionRecord {
        let now = now_unix();
        SessionRecord {
            id: id.to_string(),
            name: "T".to_string(),
            shell: "bash".to_string(),
            cwd: "/tmp".to_string(),
            created_at: now,
            last_accessed_at: now,
            owner_id: None,
            status: "active".to_string(),
            cols: 80,
            rows: 24,
            external_mux_handle: None,
            category_id: None,
            sort_order,
        }
    }

    #[test]
    fn insert_and_get_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store.insert_session(&sample("s1", 0)).unwrap();
        let got = store.get_session("s1").unwrap().unwrap();
        assert_eq!(got.name, "T");
        assert_eq!(got.status, "active");
    }

    #[test]
    fn count_non_terminated_excludes_terminated() {
        let store = Store::open_in_memory().unwrap();
        store.insert_session(&sample("s1", 0)).unwrap();
        store.insert_session(&sample("s2", 1)).unwrap();
        store.update_status("s2", "terminated").unwrap();
        assert_eq!(store.count_non_terminated().unwrap(), 1);
    }

    #[test]
    fn delete_category_uncategorizes_sessions_not_cascade() {
        let store = Store::open_in_memory().unwrap();
        let now = now_unix();
        store
            .insert_category(&CategoryRecord {
                id: "cat1".to_string(),
                name: "Work".to_string(),
                sort_order: 0,
                collapsed: false,
                owner_id: None,
                created_at: now,
            })
            .unwrap();
        let mut sess = sample("s1", 0);
        sess.category_id = Some("cat1".to_string());
        store.insert_session(&sess).unwrap();

        store.delete_category("cat1").unwrap();

        assert!(store.get_category("cat1").unwrap().is_none());
        let s = store.get_session("s1").unwrap().unwrap();
        assert_eq!(s.category_id, None);
    }

    #[test]
    fn move_session_appends_to_end_of_target_category() {
        let store = Store::open_in_memory().unwrap();
        let now = now_unix();
        store
            .insert_category(&CategoryRecord {
                id: "cat1".to_string(),
                name: "Work".to_string(),
                sort_order: 0,
                collapsed: false,
                owner_id: None,
                created_at: now,
            })
            .unwrap();
        store.insert_session(&sample("s1", 0)).unwrap();
        let mut existing = sample("s2", 0);
        existing.category_id = Some("cat1".to_string());
        store.insert_session(&existing).unwrap();

        store.move_session("s1", Some("cat1")).unwrap();

        let moved = store.get_session("s1").unwrap().unwrap();
        assert_eq!(moved.category_id, Some("cat1".to_string()));
        assert_eq!(moved.sort_order, 1);
    }

    #[test]
    fn preferences_default_when_absent() {
        let store = Store::open_in_memory().unwrap();
        let prefs = store.get_preferences("alice").unwrap();
        assert!(prefs.notify_on_input);
        assert!(prefs.notify_on_completed);
    }

    #[test]
    fn preferences_upsert_overwrites() {
        let store = Store::open_in_memory().unwrap();
        let mut prefs = store.get_preferences("alice").unwrap();
        prefs.notify_on_completed = false;
        store.upsert_preferences(&prefs).unwrap();
        let got = store.get_preferences("alice").unwrap();
        assert!(!got.notify_on_completed);
        assert!(got.notify_on_input);
    }

    #[test]
    fn scrollback_save_then_get_overwrites_prior_blob() {
        let store = Store::open_in_memory().unwrap();
        store.insert_session(&sample("s1", 0)).unwrap();
        store.save_scrollback("s1", "first", now_unix()).unwrap();
        store.save_scrollback("s1", "second", now_unix()).unwrap();
        assert_eq!(store.get_scrollback("s1").unwrap(), Some("second".to_string()));
    }

    #[test]
    fn delete_session_cascades_scrollback_and_logs() {
        let store = Store::open_in_memory().unwrap();
        store.insert_session(&sample("s1", 0)).unwrap();
        store.save_scrollback("s1", "hi", now_unix()).unwrap();
        store.append_log("s1", "create", None, now_unix()).unwrap();

        store.delete_session("s1").unwrap();

        assert!(store.get_session("s1").unwrap().is_none());
        assert_eq!(store.get_scrollback("s1").unwrap(), None);
    }
}
