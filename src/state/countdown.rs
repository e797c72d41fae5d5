//! Local countdown projection.

use std::{fmt, sync::Arc, time::Duration};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use crate::state::clock::Clock;

/// Period of the local countdown tick.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

/// Remaining time until the end of the period, split for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountdownBreakdown {
    /// Whole days.
    pub days: u64,
    /// Hours, `0..24`.
    pub hours: u64,
    /// Minutes, `0..60`.
    pub minutes: u64,
    /// Seconds, `0..60`.
    pub seconds: u64,
}

impl CountdownBreakdown {
    /// Breakdown shown once the target has been reached.
    pub const ZERO: Self = Self {
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
    };

    /// Whole seconds left from `now` until `end`, clamped at zero.
    pub fn between(now: OffsetDateTime, end: OffsetDateTime) -> Self {
        let remaining = u64::try_from((end - now).whole_seconds()).unwrap_or(0);
        Self::from_seconds(remaining)
    }

    /// Split a number of seconds into days, hours, minutes and seconds.
    pub fn from_seconds(total: u64) -> Self {
        Self {
            days: total / SECONDS_PER_DAY,
            hours: (total % SECONDS_PER_DAY) / SECONDS_PER_HOUR,
            minutes: (total % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE,
            seconds: total % SECONDS_PER_MINUTE,
        }
    }

    /// Total number of seconds represented by the breakdown.
    pub fn total_seconds(&self) -> u64 {
        self.days * SECONDS_PER_DAY
            + self.hours * SECONDS_PER_HOUR
            + self.minutes * SECONDS_PER_MINUTE
            + self.seconds
    }

    /// True once the countdown has run out.
    pub fn is_elapsed(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for CountdownBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}d {:02}h {:02}m {:02}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Projects the countdown locally between authoritative target updates.
///
/// Every tick recomputes the breakdown from the absolute end instant and the
/// clock, so a tick that fires late (suspended process, overloaded runtime)
/// lands on the correct value instead of drifting.
pub struct CountdownProjector {
    clock: Arc<dyn Clock>,
    end_instant: Option<OffsetDateTime>,
    breakdown: CountdownBreakdown,
    ticker: Option<Interval>,
}

impl CountdownProjector {
    /// Create an unarmed projector reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            end_instant: None,
            breakdown: CountdownBreakdown::ZERO,
            ticker: None,
        }
    }

    /// Target `end_instant`, replacing any previous schedule, and return the fresh breakdown.
    pub fn arm(&mut self, end_instant: OffsetDateTime) -> CountdownBreakdown {
        self.ticker = None;
        self.end_instant = Some(end_instant);
        let breakdown = self.recompute();

        let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        breakdown
    }

    /// Cancel the scheduled tick. The last breakdown stays readable.
    pub fn disarm(&mut self) {
        self.ticker = None;
    }

    /// Whether a tick is currently scheduled.
    pub fn is_armed(&self) -> bool {
        self.ticker.is_some()
    }

    /// Instant the projector counts down to, if any.
    pub fn end_instant(&self) -> Option<OffsetDateTime> {
        self.end_instant
    }

    /// Breakdown computed at the last arm or tick.
    pub fn breakdown(&self) -> CountdownBreakdown {
        self.breakdown
    }

    /// Recompute the breakdown for the current instant.
    pub fn recompute(&mut self) -> CountdownBreakdown {
        self.breakdown = match self.end_instant {
            Some(end) => CountdownBreakdown::between(self.clock.now(), end),
            None => CountdownBreakdown::ZERO,
        };
        self.breakdown
    }

    /// Wait for the next scheduled tick and recompute.
    ///
    /// Never resolves while disarmed. Cancel safe.
    pub async fn tick(&mut self) -> CountdownBreakdown {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
        self.recompute()
    }
}
