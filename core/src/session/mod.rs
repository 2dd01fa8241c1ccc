//! Session Manager: the component that owns every live PTY,
//! every scrollback ring, and the attached-client table per session.

pub mod manager;
pub mod types;

pub use manager::SessionManager;
pub use types::{ClientId, CreateOptions, SessionId, SessionView};
