use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnError, DefaultOnNull, FromInto, serde_as};
use validator::{Validate, ValidationErrors};

use crate::{dto::validation::validate_unique_standings, error::PayloadError};

/// Number of entries rendered on the podium.
pub const PODIUM_SIZE: usize = 3;
/// Number of entries kept when a period is shown as a top-ten table.
pub const TOP_TEN_SIZE: usize = 10;

/// One participant's standing in a leaderboard period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based position, unique within a snapshot.
    #[validate(range(min = 1))]
    pub rank: u32,
    /// Display name, not guaranteed unique.
    pub username: String,
    /// Opaque stable identifier, unique within a snapshot.
    #[validate(length(min = 1))]
    pub user_id: String,
    /// Amount wagered during the period.
    #[validate(range(min = 0.0))]
    pub wagered: f64,
    /// Server-supplied prize for this rank.
    #[validate(range(min = 0.0))]
    pub prize: f64,
    /// Optional avatar; absence is preserved so renderers can pick their default image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Optional visibility flag forwarded untouched from the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_hidden: Option<bool>,
}

/// Complete, self-consistent leaderboard state for one period.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_unique_standings"))]
pub struct LeaderboardSnapshot {
    /// Podium entries, ranks 1 to 3.
    #[validate(length(max = 3), nested)]
    pub top_three: Vec<LeaderboardEntry>,
    /// Remaining ranked entries, rank 4 onwards.
    #[validate(nested)]
    pub challengers: Vec<LeaderboardEntry>,
    /// Past periods, most recent first.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    #[validate(nested)]
    pub history: Vec<HistoricalPeriodSummary>,
}

impl LeaderboardSnapshot {
    /// Decode and validate a raw JSON payload.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, PayloadError> {
        let snapshot: Self = serde_json::from_value(value)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Decode an archived period as served by the historical endpoint.
    ///
    /// Missing or `null` lists decode as empty and no snapshot invariant is
    /// checked; archived data is only ever shown through [`Self::top_ten`].
    pub fn from_archived_value(value: serde_json::Value) -> Result<Self, PayloadError> {
        let archived: ArchivedSnapshot = serde_json::from_value(value)?;
        Ok(archived.into())
    }

    /// Podium and challengers merged and sorted by rank.
    pub fn ranked_entries(&self) -> Vec<&LeaderboardEntry> {
        let mut entries = self
            .top_three
            .iter()
            .chain(self.challengers.iter())
            .collect::<Vec<_>>();
        entries.sort_by_key(|entry| entry.rank);
        entries
    }

    /// Ranked entries paired with the prize they are displayed with.
    pub fn standings<'a>(&'a self, prizes: &PrizeTable) -> Vec<Standing<'a>> {
        self.ranked_entries()
            .into_iter()
            .map(|entry| Standing {
                entry,
                prize: prizes.prize_for(entry),
            })
            .collect()
    }

    /// Re-split the ten best entries into podium and challengers, dropping history.
    pub fn top_ten(&self) -> Self {
        let mut entries = self
            .ranked_entries()
            .into_iter()
            .take(TOP_TEN_SIZE)
            .cloned()
            .collect::<Vec<_>>();
        let challengers = entries.split_off(entries.len().min(PODIUM_SIZE));
        Self {
            top_three: entries,
            challengers,
            history: Vec::new(),
        }
    }

    /// True when neither the podium nor the challengers hold any entry.
    pub fn is_empty(&self) -> bool {
        self.top_three.is_empty() && self.challengers.is_empty()
    }
}

/// Lenient shape of a past period's leaderboard.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArchivedSnapshot {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    top_three: Vec<LeaderboardEntry>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    challengers: Vec<LeaderboardEntry>,
}

impl From<ArchivedSnapshot> for LeaderboardSnapshot {
    fn from(value: ArchivedSnapshot) -> Self {
        Self {
            top_three: value.top_three,
            challengers: value.challengers,
            history: Vec::new(),
        }
    }
}

/// Headline result of a finished period.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalPeriodSummary {
    /// Unique identifier of the period.
    pub id: String,
    /// Display label for the period.
    pub period: String,
    /// Display label for the period date.
    pub date: String,
    /// Winner of the period.
    pub winner: PeriodWinner,
    /// Full leaderboard for the period when the backend embeds it.
    ///
    /// Decoded leniently: an unreadable embedded snapshot becomes `None`, so
    /// the period falls back to fetching by `end_date`.
    #[serde_as(deserialize_as = "DefaultOnError<Option<FromInto<ArchivedSnapshot>>>")]
    #[serde(
        rename = "leaderboard_data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub leaderboard_data: Option<LeaderboardSnapshot>,
    /// End instant of the period, used to fetch the leaderboard on demand.
    #[serde(rename = "end_date", default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl Validate for HistoricalPeriodSummary {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        // Embedded snapshots are left unchecked; they are only shown through `top_ten`.
        errors.merge_self("winner", self.winner.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Winner line of a historical period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PeriodWinner {
    /// Winner's display name.
    pub username: String,
    /// Total wagered by the winner, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub total_wagered: Option<f64>,
    /// Prize awarded to the winner.
    #[validate(range(min = 0.0))]
    pub prize: f64,
}

/// Entry paired with the prize it should be displayed with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standing<'a> {
    /// Underlying leaderboard entry.
    pub entry: &'a LeaderboardEntry,
    /// Prize after applying the rank table.
    pub prize: f64,
}

/// Fixed rank to prize mapping; unmapped ranks keep the server-supplied prize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrizeTable(IndexMap<u32, f64>);

impl PrizeTable {
    /// Build a table from an explicit rank to amount mapping.
    pub fn new(amounts: IndexMap<u32, f64>) -> Self {
        Self(amounts)
    }

    /// Prize displayed for `entry`.
    pub fn prize_for(&self, entry: &LeaderboardEntry) -> f64 {
        self.0.get(&entry.rank).copied().unwrap_or(entry.prize)
    }
}

impl Default for PrizeTable {
    fn default() -> Self {
        Self(IndexMap::from([
            (1, 400.0),
            (2, 150.0),
            (3, 125.0),
            (4, 50.0),
            (5, 25.0),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry(rank: u32, user_id: &str) -> LeaderboardEntry {
        LeaderboardEntry {
            rank,
            username: format!("player-{user_id}"),
            user_id: user_id.into(),
            wagered: 1_000.0 / f64::from(rank),
            prize: 10.0,
            avatar_url: None,
            is_hidden: None,
        }
    }

    fn snapshot_with(ranks: &[u32]) -> LeaderboardSnapshot {
        let (top, rest): (Vec<_>, Vec<_>) = ranks.iter().partition(|rank| **rank <= 3);
        LeaderboardSnapshot {
            top_three: top.into_iter().map(|&r| entry(r, &format!("u{r}"))).collect(),
            challengers: rest.into_iter().map(|&r| entry(r, &format!("u{r}"))).collect(),
            history: Vec::new(),
        }
    }

    #[test]
    fn decodes_backend_payload() {
        let payload = json!({
            "topThree": [
                {"rank": 1, "username": "alice", "userId": "a", "wagered": 1500.5, "prize": 400, "avatarUrl": "https://cdn.example/a.png"},
                {"rank": 2, "username": "bob", "userId": "b", "wagered": 900, "prize": 150}
            ],
            "challengers": [
                {"rank": 4, "username": "dan", "userId": "d", "wagered": 100, "prize": 50, "isHidden": true}
            ],
            "history": [
                {
                    "id": "p1",
                    "period": "Week 12",
                    "date": "2025-03-20",
                    "winner": {"username": "carol", "totalWagered": 4200, "prize": 400},
                    "end_date": "2025-03-20T00:00:00.000Z"
                }
            ]
        });

        let snapshot = LeaderboardSnapshot::from_json_value(payload).unwrap();
        assert_eq!(snapshot.top_three.len(), 2);
        assert_eq!(
            snapshot.top_three[0].avatar_url.as_deref(),
            Some("https://cdn.example/a.png")
        );
        assert_eq!(snapshot.top_three[1].avatar_url, None);
        assert_eq!(snapshot.challengers[0].is_hidden, Some(true));
        assert_eq!(
            snapshot.history[0].end_date.as_deref(),
            Some("2025-03-20T00:00:00.000Z")
        );
        assert_eq!(snapshot.history[0].winner.total_wagered, Some(4200.0));
    }

    #[test]
    fn missing_or_null_history_decodes_as_empty() {
        let missing = json!({"topThree": [], "challengers": []});
        let null = json!({"topThree": [], "challengers": [], "history": null});

        assert!(LeaderboardSnapshot::from_json_value(missing).unwrap().history.is_empty());
        assert!(LeaderboardSnapshot::from_json_value(null).unwrap().history.is_empty());
    }

    #[test]
    fn rejects_non_sequence_podium() {
        let payload = json!({"topThree": "nope", "challengers": [], "history": []});
        let err = LeaderboardSnapshot::from_json_value(payload).unwrap_err();
        assert!(matches!(err, PayloadError::Decode(_)));
    }

    #[test]
    fn rejects_missing_challengers() {
        let payload = json!({"topThree": []});
        assert!(LeaderboardSnapshot::from_json_value(payload).is_err());
    }

    #[test]
    fn rejects_oversized_podium_and_bad_ranges() {
        let mut snapshot = snapshot_with(&[1, 2, 3]);
        snapshot.top_three.push(entry(4, "u4"));
        assert!(snapshot.validate().is_err());

        let mut snapshot = snapshot_with(&[1, 2]);
        snapshot.top_three[1].wagered = -5.0;
        assert!(snapshot.validate().is_err());

        let mut snapshot = snapshot_with(&[1]);
        snapshot.top_three[0].rank = 0;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn malformed_archived_period_does_not_reject_live_board() {
        let live = |rank: u32| json!({"rank": rank, "username": "live", "userId": format!("live-{rank}"), "wagered": 10, "prize": 0});
        let archived = |rank: u32| json!({"rank": rank, "username": "old", "userId": "same", "wagered": 5, "prize": 0});
        let period = |id: &str, data: serde_json::Value| json!({
            "id": id,
            "period": "Week 1",
            "date": "2025-01-07",
            "winner": {"username": "old", "prize": 400},
            "leaderboard_data": data,
            "end_date": "2025-01-07T00:00:00.000Z"
        });
        let payload = json!({
            "topThree": [live(1), live(2)],
            "challengers": [live(4)],
            "history": [
                period("oversized", json!({"topThree": [archived(1), archived(2), archived(3), archived(4)], "challengers": []})),
                period("garbage", json!("not a leaderboard")),
                period("partial", json!({"challengers": [archived(5)]}))
            ]
        });

        let snapshot = LeaderboardSnapshot::from_json_value(payload).unwrap();
        assert_eq!(snapshot.ranked_entries().len(), 3);

        let oversized = snapshot.history[0].leaderboard_data.as_ref().unwrap();
        let trimmed = oversized.top_ten();
        assert_eq!(trimmed.top_three.len(), 3);
        assert_eq!(trimmed.challengers.len(), 1);

        assert_eq!(snapshot.history[1].leaderboard_data, None);
        assert_eq!(
            snapshot.history[1].end_date.as_deref(),
            Some("2025-01-07T00:00:00.000Z")
        );

        let partial = snapshot.history[2].leaderboard_data.as_ref().unwrap();
        assert!(partial.top_three.is_empty());
        assert_eq!(partial.challengers[0].rank, 5);
    }

    #[test]
    fn invalid_period_winner_is_still_rejected() {
        let summary = HistoricalPeriodSummary {
            id: "p1".into(),
            period: "Week 1".into(),
            date: "2025-01-07".into(),
            winner: PeriodWinner {
                username: "alice".into(),
                total_wagered: Some(-1.0),
                prize: 400.0,
            },
            leaderboard_data: None,
            end_date: None,
        };
        assert!(summary.validate().is_err());
    }

    #[test]
    fn archived_values_tolerate_missing_lists() {
        let empty = LeaderboardSnapshot::from_archived_value(json!({})).unwrap();
        assert!(empty.is_empty());

        let nulls =
            LeaderboardSnapshot::from_archived_value(json!({"topThree": null, "challengers": null}))
                .unwrap();
        assert!(nulls.is_empty());

        let podium_only = LeaderboardSnapshot::from_archived_value(json!({
            "topThree": [{"rank": 1, "username": "a", "userId": "a", "wagered": 1, "prize": 400}]
        }))
        .unwrap();
        assert_eq!(podium_only.top_three.len(), 1);
        assert!(podium_only.challengers.is_empty());

        assert!(LeaderboardSnapshot::from_archived_value(json!({"topThree": "nope"})).is_err());
    }

    #[test]
    fn ranked_entries_merge_and_sort() {
        let snapshot = LeaderboardSnapshot {
            top_three: vec![entry(2, "b"), entry(1, "a")],
            challengers: vec![entry(5, "e"), entry(4, "d")],
            history: Vec::new(),
        };
        let ranks = snapshot
            .ranked_entries()
            .iter()
            .map(|entry| entry.rank)
            .collect::<Vec<_>>();
        assert_eq!(ranks, vec![1, 2, 4, 5]);
    }

    #[test]
    fn top_ten_truncates_and_resplits() {
        let mut snapshot = snapshot_with(&(1..=12).collect::<Vec<_>>());
        snapshot.history.push(HistoricalPeriodSummary {
            id: "p0".into(),
            period: "Week 0".into(),
            date: "2025-01-01".into(),
            winner: PeriodWinner {
                username: "zed".into(),
                total_wagered: Some(1.0),
                prize: 400.0,
            },
            leaderboard_data: None,
            end_date: None,
        });

        let top = snapshot.top_ten();
        assert_eq!(top.top_three.len(), 3);
        assert_eq!(top.challengers.len(), 7);
        assert_eq!(top.challengers.last().map(|e| e.rank), Some(10));
        assert!(top.history.is_empty());

        let small = snapshot_with(&[1, 2]).top_ten();
        assert_eq!(small.top_three.len(), 2);
        assert!(small.challengers.is_empty());
    }

    #[test]
    fn prize_table_overrides_mapped_ranks_only() {
        let prizes = PrizeTable::default();
        let snapshot = snapshot_with(&[1, 4, 6]);
        let standings = snapshot.standings(&prizes);
        let amounts = standings.iter().map(|s| s.prize).collect::<Vec<_>>();
        assert_eq!(amounts, vec![400.0, 50.0, 10.0]);
    }
}
