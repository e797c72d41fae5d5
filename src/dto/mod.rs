//! Wire-level data types exchanged with the leaderboard backend.

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Countdown payloads and end-instant decoding.
pub mod countdown;
/// Leaderboard snapshot, entries and historical periods.
pub mod leaderboard;
/// Cross-field validation helpers.
pub mod validation;
/// Push channel framing.
pub mod ws;

/// Render an instant the way the backend expects it in query strings and logs.
pub fn format_instant(instant: OffsetDateTime) -> String {
    instant
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
