//! Loading the top ten of a finished period for the history view.

use tracing::{debug, warn};

use crate::{
    dto::leaderboard::{HistoricalPeriodSummary, LeaderboardSnapshot},
    services::pull_service::PullSource,
};

/// Resolve the leaderboard of `summary`, trimmed to its ten best entries.
///
/// The embedded snapshot wins; otherwise the period is fetched by its end date.
/// Returns `None` when neither is available or the fetch fails.
pub async fn load_period(
    source: &dyn PullSource,
    summary: &HistoricalPeriodSummary,
) -> Option<LeaderboardSnapshot> {
    if let Some(ref snapshot) = summary.leaderboard_data {
        return Some(snapshot.top_ten());
    }

    let Some(ref end_date) = summary.end_date else {
        debug!(period = %summary.id, "historical period has no leaderboard data nor end date");
        return None;
    };

    match source.fetch_historical(end_date).await {
        Ok(snapshot) => Some(snapshot.top_ten()),
        Err(err) => {
            warn!(
                period = %summary.id,
                end_date = %end_date,
                error = %err,
                "failed to fetch historical leaderboard"
            );
            None
        }
    }
}
