//! Spaced-repetition review models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SyncStatus;
use crate::util::{local_record_id, now_ms};

/// Rating given to an entry during review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewRating {
    Again,
    Hard,
    Good,
    Easy,
}

impl ReviewRating {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Again => "again",
            Self::Hard => "hard",
            Self::Good => "good",
            Self::Easy => "easy",
        }
    }
}

impl fmt::Display for ReviewRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "again" => Ok(Self::Again),
            "hard" => Ok(Self::Hard),
            "good" => Ok(Self::Good),
            "easy" => Ok(Self::Easy),
            other => Err(format!("unknown review rating: {other}")),
        }
    }
}

/// Per-entry scheduling snapshot, lazily created on the first review.
///
/// At most one row exists per entry. The row is mutated by every review;
/// the immutable history lives in [`ReviewEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    pub id: String,
    pub user_id: String,
    pub entry_id: String,
    pub ease_factor: f64,
    pub interval_days: i64,
    pub repetition_count: i64,
    pub lapse_count: i64,
    pub next_due_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<i64>,
}

impl ReviewState {
    /// Fresh state for an entry that has never been reviewed.
    #[must_use]
    pub fn new(user_id: impl Into<String>, entry_id: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: local_record_id(),
            user_id: user_id.into(),
            entry_id: entry_id.into(),
            ease_factor: crate::review::EASE_DEFAULT,
            interval_days: 0,
            repetition_count: 0,
            lapse_count: 0,
            next_due_at: now,
            created_at: now,
            updated_at: now,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
        }
    }
}

/// One row per review action, append-only and never mutated.
///
/// Captures the rating given and the interval scheduled as a result; used
/// for audit, streak computation, and re-derivation of state if needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub id: String,
    pub user_id: String,
    pub entry_id: String,
    pub rating: ReviewRating,
    /// Interval (days) scheduled by this review
    pub interval_days: i64,
    /// Ease factor after this review
    pub ease_factor: f64,
    pub reviewed_at: i64,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<i64>,
}

impl ReviewEvent {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        entry_id: impl Into<String>,
        rating: ReviewRating,
        interval_days: i64,
        ease_factor: f64,
        reviewed_at: i64,
    ) -> Self {
        Self {
            id: local_record_id(),
            user_id: user_id.into(),
            entry_id: entry_id.into(),
            rating,
            interval_days,
            ease_factor,
            reviewed_at,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_roundtrips_through_strings() {
        for rating in [ReviewRating::Again, ReviewRating::Hard, ReviewRating::Good, ReviewRating::Easy] {
            assert_eq!(rating.as_str().parse::<ReviewRating>().unwrap(), rating);
        }
        assert!("medium".parse::<ReviewRating>().is_err());
    }

    #[test]
    fn fresh_state_is_due_immediately() {
        let state = ReviewState::new("user-1", "entry-1");
        assert_eq!(state.interval_days, 0);
        assert_eq!(state.repetition_count, 0);
        assert!(state.next_due_at <= now_ms());
    }
}
