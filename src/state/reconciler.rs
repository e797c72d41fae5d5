//! Last-write-wins application of pushed and pulled updates.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::{
    dto::{countdown::CountdownPayload, leaderboard::LeaderboardSnapshot},
    error::PayloadError,
};

/// Outcome of applying a countdown update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownChange {
    /// The update named the target already in place.
    Unchanged,
    /// The target moved; the projector must be re-armed with it.
    Rearm(OffsetDateTime),
}

/// Owner of the canonical leaderboard snapshot and countdown target.
///
/// Updates from push and pull transports are applied last-write-wins: there is
/// no version comparison, so a stale response applied after a newer one wins.
#[derive(Debug, Default)]
pub struct StateReconciler {
    snapshot: Arc<LeaderboardSnapshot>,
    target: Option<OffsetDateTime>,
}

impl StateReconciler {
    /// Start with an empty snapshot and no countdown target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> &LeaderboardSnapshot {
        &self.snapshot
    }

    /// Shared handle on the current snapshot, handed to readers.
    pub fn shared_snapshot(&self) -> Arc<LeaderboardSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Current countdown target.
    pub fn target(&self) -> Option<OffsetDateTime> {
        self.target
    }

    /// Replace the snapshot wholesale.
    pub fn apply_leaderboard_update(&mut self, update: LeaderboardSnapshot) {
        self.snapshot = Arc::new(update);
    }

    /// Replace the countdown target when it names a different instant.
    pub fn apply_countdown_update(
        &mut self,
        update: CountdownPayload,
    ) -> Result<CountdownChange, PayloadError> {
        let end = update.end_date.resolve()?;
        if self.target == Some(end) {
            return Ok(CountdownChange::Unchanged);
        }
        self.target = Some(end);
        Ok(CountdownChange::Rearm(end))
    }

    /// Decode, validate and apply a raw `leaderboard_update` payload.
    ///
    /// On error the current snapshot is left untouched.
    pub fn accept_leaderboard_payload(
        &mut self,
        payload: serde_json::Value,
    ) -> Result<(), PayloadError> {
        let update = LeaderboardSnapshot::from_json_value(payload)?;
        self.apply_leaderboard_update(update);
        Ok(())
    }

    /// Decode and apply a raw `countdown_update` payload.
    ///
    /// On error the current target is left untouched.
    pub fn accept_countdown_payload(
        &mut self,
        payload: serde_json::Value,
    ) -> Result<CountdownChange, PayloadError> {
        let update = CountdownPayload::from_json_value(payload)?;
        self.apply_countdown_update(update)
    }
}
