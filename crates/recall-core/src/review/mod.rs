//! Spaced-repetition scheduling.
//!
//! A fixed-parameter SM-2 style step: deterministic and reproducible given
//! `(ease, interval, rating)`. All ease arithmetic is rounded to two
//! decimals so repeated steps stay bit-for-bit stable.

use crate::models::ReviewRating;

/// Ease factor assigned to an entry's first review state.
pub const EASE_DEFAULT: f64 = 2.5;
/// Lower bound the ease factor can never fall below.
pub const EASE_MIN: f64 = 1.3;
/// Upper bound the ease factor can never rise above.
pub const EASE_MAX: f64 = 3.0;

const EASE_STEP_AGAIN: f64 = 0.2;
const EASE_STEP_HARD: f64 = 0.15;
const EASE_STEP_EASY: f64 = 0.15;
const HARD_INTERVAL_FACTOR: f64 = 1.2;
const EASY_BONUS: f64 = 1.35;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Scheduling inputs/outputs for one review step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub ease_factor: f64,
    pub interval_days: i64,
    pub repetition_count: i64,
    pub lapse_count: i64,
}

impl Schedule {
    /// Schedule for an entry that has never been reviewed.
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            ease_factor: EASE_DEFAULT,
            interval_days: 0,
            repetition_count: 0,
            lapse_count: 0,
        }
    }
}

/// Apply one review rating to the current schedule.
#[must_use]
pub fn next_schedule(current: &Schedule, rating: ReviewRating) -> Schedule {
    let first_review = current.interval_days == 0;

    match rating {
        ReviewRating::Again => Schedule {
            ease_factor: clamp_ease(current.ease_factor - EASE_STEP_AGAIN),
            interval_days: 1,
            repetition_count: 0,
            lapse_count: current.lapse_count + 1,
        },
        ReviewRating::Hard => Schedule {
            ease_factor: clamp_ease(current.ease_factor - EASE_STEP_HARD),
            interval_days: scale_interval(current.interval_days, HARD_INTERVAL_FACTOR),
            repetition_count: current.repetition_count + 1,
            lapse_count: current.lapse_count,
        },
        ReviewRating::Good => Schedule {
            ease_factor: current.ease_factor,
            interval_days: if first_review {
                1
            } else {
                scale_interval(current.interval_days, current.ease_factor)
            },
            repetition_count: current.repetition_count + 1,
            lapse_count: current.lapse_count,
        },
        ReviewRating::Easy => Schedule {
            ease_factor: clamp_ease(current.ease_factor + EASE_STEP_EASY),
            interval_days: if first_review {
                2
            } else {
                scale_interval(current.interval_days, current.ease_factor * EASY_BONUS)
            },
            repetition_count: current.repetition_count + 1,
            lapse_count: current.lapse_count,
        },
    }
}

/// Next-due timestamp for an interval starting now.
#[must_use]
pub const fn next_due_at(now_ms: i64, interval_days: i64) -> i64 {
    now_ms + interval_days * DAY_MS
}

fn scale_interval(interval_days: i64, factor: f64) -> i64 {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let scaled = (interval_days as f64 * factor).round() as i64;
    scaled.max(1)
}

fn clamp_ease(ease: f64) -> f64 {
    round2(ease.clamp(EASE_MIN, EASE_MAX))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Count consecutive calendar days with at least one review event.
///
/// Days are computed in the caller-supplied timezone offset (minutes east
/// of UTC). Scans backward from today; a streak that ends yesterday still
/// counts ("reviewed yesterday but not yet today"), a gap of two or more
/// days breaks it.
#[must_use]
pub fn streak_days(reviewed_at_ms: &[i64], now_ms: i64, tz_offset_minutes: i64) -> u32 {
    use std::collections::BTreeSet;

    let days: BTreeSet<i64> = reviewed_at_ms
        .iter()
        .map(|ts| day_index(*ts, tz_offset_minutes))
        .collect();

    let today = day_index(now_ms, tz_offset_minutes);
    let mut cursor = if days.contains(&today) {
        today
    } else if days.contains(&(today - 1)) {
        today - 1
    } else {
        return 0;
    };

    let mut streak = 0u32;
    while days.contains(&cursor) {
        streak += 1;
        cursor -= 1;
    }
    streak
}

/// Whether a timestamp falls on today's calendar day in the given offset.
#[must_use]
pub fn is_same_local_day(ts_ms: i64, now_ms: i64, tz_offset_minutes: i64) -> bool {
    day_index(ts_ms, tz_offset_minutes) == day_index(now_ms, tz_offset_minutes)
}

fn day_index(ts_ms: i64, tz_offset_minutes: i64) -> i64 {
    (ts_ms + tz_offset_minutes * 60_000).div_euclid(DAY_MS)
}

/// UTC timestamp at which the caller's current local day started.
#[must_use]
pub fn local_day_start(now_ms: i64, tz_offset_minutes: i64) -> i64 {
    day_index(now_ms, tz_offset_minutes) * DAY_MS - tz_offset_minutes * 60_000
}

/// UTC timestamp at which the caller's current local day ends (exclusive).
#[must_use]
pub fn local_day_end(now_ms: i64, tz_offset_minutes: i64) -> i64 {
    local_day_start(now_ms, tz_offset_minutes) + DAY_MS
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn schedule(ease: f64, interval: i64) -> Schedule {
        Schedule {
            ease_factor: ease,
            interval_days: interval,
            repetition_count: 3,
            lapse_count: 1,
        }
    }

    #[test]
    fn good_scales_interval_by_ease() {
        let next = next_schedule(&schedule(2.5, 6), ReviewRating::Good);
        assert_eq!(next.interval_days, 15);
        assert_eq!(next.ease_factor, 2.5);
        assert_eq!(next.repetition_count, 4);
        assert_eq!(next.lapse_count, 1);
    }

    #[test]
    fn again_resets_interval_and_repetitions() {
        let next = next_schedule(&schedule(2.5, 0), ReviewRating::Again);
        assert_eq!(next.interval_days, 1);
        assert_eq!(next.ease_factor, 2.3);
        assert_eq!(next.repetition_count, 0);
        assert_eq!(next.lapse_count, 2);
    }

    #[test]
    fn ease_floors_at_minimum() {
        let next = next_schedule(&schedule(1.35, 10), ReviewRating::Again);
        assert_eq!(next.ease_factor, EASE_MIN);
    }

    #[test]
    fn ease_caps_at_maximum() {
        let next = next_schedule(&schedule(2.95, 10), ReviewRating::Easy);
        assert_eq!(next.ease_factor, EASE_MAX);
    }

    #[test]
    fn hard_multiplies_interval_below_ease() {
        let next = next_schedule(&schedule(2.5, 10), ReviewRating::Hard);
        assert_eq!(next.interval_days, 12);
        assert_eq!(next.ease_factor, 2.35);
        assert_eq!(next.repetition_count, 4);
    }

    #[test]
    fn hard_never_drops_below_one_day() {
        let next = next_schedule(&schedule(2.5, 0), ReviewRating::Hard);
        assert_eq!(next.interval_days, 1);
    }

    #[test]
    fn first_review_good_and_easy_use_fixed_intervals() {
        let good = next_schedule(&Schedule::initial(), ReviewRating::Good);
        assert_eq!(good.interval_days, 1);
        assert_eq!(good.ease_factor, EASE_DEFAULT);

        let easy = next_schedule(&Schedule::initial(), ReviewRating::Easy);
        assert_eq!(easy.interval_days, 2);
        assert_eq!(easy.ease_factor, 2.65);
    }

    #[test]
    fn repeated_steps_stay_stable() {
        // Ease rounding keeps repeated subtraction exact.
        let mut schedule = schedule(2.5, 4);
        for _ in 0..3 {
            schedule = next_schedule(&schedule, ReviewRating::Hard);
        }
        assert_eq!(schedule.ease_factor, 2.05);
    }

    #[test]
    fn next_due_adds_whole_days() {
        assert_eq!(next_due_at(1_000, 3), 1_000 + 3 * DAY_MS);
        assert_eq!(next_due_at(1_000, 0), 1_000);
    }

    const DAY: i64 = DAY_MS;

    #[test]
    fn streak_counts_consecutive_days() {
        let now = 20 * DAY + 5_000_000;
        // Events today, yesterday, two days ago; none three days ago.
        let events = vec![now - 1_000, now - DAY, now - 2 * DAY];
        assert_eq!(streak_days(&events, now, 0), 3);
    }

    #[test]
    fn streak_survives_missing_today() {
        let now = 20 * DAY + 5_000_000;
        let events = vec![now - DAY, now - 2 * DAY];
        assert_eq!(streak_days(&events, now, 0), 2);
    }

    #[test]
    fn streak_breaks_after_two_day_gap() {
        let now = 20 * DAY + 5_000_000;
        let events = vec![now - 2 * DAY];
        assert_eq!(streak_days(&events, now, 0), 0);
    }

    #[test]
    fn streak_is_empty_without_events() {
        assert_eq!(streak_days(&[], 20 * DAY, 0), 0);
    }

    #[test]
    fn streak_respects_timezone_offset() {
        // 00:30 UTC; in UTC+2 this is already "today", the event at
        // 23:30 UTC the previous day lands on the same local day.
        let now = 21 * DAY + 30 * 60_000;
        let event = now - 60 * 60_000;
        assert_eq!(streak_days(&[event], now, 120), 1);
        // In UTC the event belongs to yesterday; streak still holds.
        assert_eq!(streak_days(&[event], now, 0), 1);
    }

    #[test]
    fn same_local_day_check() {
        let now = 21 * DAY + 30 * 60_000;
        assert!(is_same_local_day(now - 60_000, now, 0));
        assert!(!is_same_local_day(now - DAY, now, 0));
    }

    #[test]
    fn local_day_bounds_shift_with_offset() {
        let now = 21 * DAY + 30 * 60_000;
        assert_eq!(local_day_start(now, 0), 21 * DAY);
        assert_eq!(local_day_end(now, 0), 22 * DAY);
        // UTC+2: the local day started two hours earlier in UTC terms
        assert_eq!(local_day_start(now, 120), 21 * DAY - 120 * 60_000);
    }
}
