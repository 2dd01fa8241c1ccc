//! Error taxonomy shared by every core component.
//!
//! `CoreError` is the single currency crossing module boundaries; the Connection
//! Handler (in the server crate) maps each variant to the wire-level error frame
//! without needing to know which component produced it.

use thiserror::Error;

/// Error taxonomy for the session/persistence core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Shape or bound violation on a client-supplied value.
    #[error("{0}")]
    InvalidInput(String),

    /// Unknown session or category id.
    #[error("{0}")]
    NotFound(String),

    /// Non-terminated session count is already at the configured maximum.
    #[error("Maximum session limit ({0}) reached")]
    QuotaExceeded(usize),

    /// Identity resolution failed; the caller must close the transport.
    #[error("unauthorized")]
    Unauthorized,

    /// Token bucket empty; caller should reply with an error frame, not disconnect.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The durable store failed outside the compensating-cleanup path of `create`.
    #[error("store error: {0}")]
    TransientStore(#[from] rusqlite::Error),

    /// Spawning a PTY failed synchronously.
    #[error("failed to spawn pty: {0}")]
    PtySpawn(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
