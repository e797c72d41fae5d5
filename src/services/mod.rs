//! Transports, fallback policy and the driver behind [`SyncClient`].

/// Push/pull arbitration and connectivity tracking.
pub mod fallback;
/// Historical period loading for the history view.
pub mod history_service;
/// HTTP pull transport.
pub mod pull_service;
/// Client handle and the driver task owning all state.
pub mod sync_client;
/// WebSocket push channel with reconnect policy.
pub mod websocket_service;

pub use self::sync_client::SyncClient;
