//! Value types shared across the session module: the public identifier, the
//! API-facing projection of a durable record, and the inputs to `create`.

use crate::store::SessionRecord;

/// Opaque session identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Server-assigned identifier for one client connection. Allocated by
/// `SessionManager::next_client_id`.
pub type ClientId = u64;

/// Inputs to `SessionManager::create`. Bounds on `name`/`shell`/
/// `cwd`/`cols`/`rows` are enforced both here and, redundantly but
/// deliberately, at the Connection Handler boundary — a caller driving the
/// core library directly gets the same guarantees a WebSocket client does.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub name: Option<String>,
    pub shell: Option<String>,
    pub cwd: Option<String>,
    /// Unvalidated wire-width integer — `create` rejects anything outside
    /// `[1, 500]` rather than narrowing it first, so an oversized value is
    /// an `InvalidInput` instead of silently wrapping into range.
    pub cols: Option<i64>,
    pub rows: Option<i64>,
    pub owner: Option<String>,
    pub env: Vec<(String, String)>,
}

/// API-facing projection of a session: the durable record plus whether a
/// live in-memory session currently backs it.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
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
    pub category_id: Option<String>,
    pub sort_order: i64,
    pub attachable: bool,
}

impl SessionView {
    pub fn from_record(record: SessionRecord, attachable: bool) -> Self {
        Self {
            id: record.id,
            name: record.name,
            shell: record.shell,
            cwd: record.cwd,
            created_at: record.created_at,
            last_accessed_at: record.last_accessed_at,
            owner_id: record.owner_id,
            status: record.status,
            cols: record.cols,
            rows: record.rows,
            category_id: record.category_id,
            sort_order: record.sort_order,
            attachable,
        }
    }
}
