//! Validation helpers for DTOs.

use std::collections::HashSet;

use validator::ValidationError;

use crate::dto::leaderboard::LeaderboardSnapshot;

/// Validates that podium and challengers never share a rank or a user ID.
///
/// # Examples
///
/// ```ignore
/// // ranks [1, 2] + [4]       -> Ok
/// // ranks [1, 2] + [2]       -> Err - duplicate rank
/// // user IDs ["a"] + ["a"]   -> Err - duplicate user
/// ```
pub fn validate_unique_standings(snapshot: &LeaderboardSnapshot) -> Result<(), ValidationError> {
    let mut ranks = HashSet::new();
    let mut users = HashSet::new();

    for entry in snapshot.top_three.iter().chain(snapshot.challengers.iter()) {
        if !ranks.insert(entry.rank) {
            let mut err = ValidationError::new("duplicate_rank");
            err.message = Some(format!("rank {} appears more than once", entry.rank).into());
            return Err(err);
        }
        if !users.insert(entry.user_id.as_str()) {
            let mut err = ValidationError::new("duplicate_user_id");
            err.message = Some(format!("user `{}` appears more than once", entry.user_id).into());
            return Err(err);
        }
    }

    Ok(())
}
