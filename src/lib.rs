//! Client-side synchronisation core for a periodic leaderboard feed.
//!
//! Keeps a local copy of the current leaderboard and period countdown in sync
//! with a backend over a WebSocket push channel, falling back to HTTP pulls
//! while the channel is down.

/// Client settings and reconnect policy.
pub mod config;
/// Wire payloads exchanged with the backend.
pub mod dto;
/// Error types.
pub mod error;
/// Push and pull transports driven by [`SyncClient`].
pub mod services;
/// Reconciled state, countdown projection and the published [`SyncState`].
pub mod state;

pub use config::ClientConfig;
pub use services::SyncClient;
pub use state::{Connectivity, SyncState};
