//! Client-side state: reconciled snapshot and countdown projection.

pub mod clock;
pub mod countdown;
pub mod reconciler;

use std::{fmt, sync::Arc};

use serde::Serialize;
use time::OffsetDateTime;

use crate::dto::leaderboard::LeaderboardSnapshot;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::countdown::{CountdownBreakdown, CountdownProjector};
pub use self::reconciler::{CountdownChange, StateReconciler};

/// Connectivity of the push channel as seen by the presentation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// No connect or error event has been observed yet.
    #[default]
    Connecting,
    /// The push channel is up.
    Connected,
    /// The push channel is down; data comes from pull fallbacks only.
    Disconnected,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}

/// Read-only view exposed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    /// Current push channel connectivity.
    pub connectivity: Connectivity,
    /// Last accepted leaderboard snapshot.
    pub leaderboard: Arc<LeaderboardSnapshot>,
    /// Countdown breakdown computed at the last update or tick.
    pub countdown: CountdownBreakdown,
    /// Authoritative end of the current period, once known.
    pub end_instant: Option<OffsetDateTime>,
}
