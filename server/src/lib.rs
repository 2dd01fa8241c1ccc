//! rterm server: the HTTP/WebSocket front door built on `rterm-core`.

pub mod app;
pub mod connection;
pub mod identity;
pub mod web_server;

pub use app::AppServer;
pub use web_server::router;
