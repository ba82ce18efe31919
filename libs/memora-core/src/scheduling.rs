//! Score, interval and due-date transitions.
//!
//! Every function here is pure: the reference day is passed in explicitly and
//! the input record is never mutated.

use chrono::{Days, NaiveDate};

use crate::types::{is_mastered, DecayPolicy, ItemProgress, MAX_SCORE};

/// Points earned by a correct answer before the streak bonus.
pub const BASE_POINTS: u32 = 5;
/// Extra points per answer already in the current streak.
pub const STREAK_BONUS: u32 = 2;
/// Score lost on a wrong answer.
pub const WRONG_PENALTY: u32 = 15;
/// Interval multiplier applied on every correct answer.
pub const INTERVAL_GROWTH: f64 = 2.5;
/// Interval ceiling for items that are not mastered.
pub const MAX_LEARNING_INTERVAL: f64 = 60.0;
/// Interval floor for mastered items.
pub const MIN_MASTERED_INTERVAL: f64 = 30.0;
/// Decay never pushes a score below this value.
pub const DECAY_FLOOR: u32 = 30;

/// Apply a correct answer given on `today`.
pub fn process_correct_answer(item: &ItemProgress, today: NaiveDate) -> ItemProgress {
    let is_new_day = item.last_correct_date != Some(today);
    let correct_days = item.correct_days.saturating_add(u32::from(is_new_day));

    let points = BASE_POINTS.saturating_add(STREAK_BONUS.saturating_mul(item.streak));
    let score = item.score.saturating_add(points).min(MAX_SCORE);

    let grown = item.interval_days * INTERVAL_GROWTH;
    let interval_days = if is_mastered(score, correct_days) {
        grown.max(MIN_MASTERED_INTERVAL)
    } else {
        grown.min(MAX_LEARNING_INTERVAL)
    }
    .max(1.0);

    ItemProgress {
        score,
        interval_days,
        next_review_at: next_review_after(today, interval_days),
        streak: item.streak.saturating_add(1),
        correct_days,
        last_correct_date: Some(today),
        decay_applied_for: item.decay_applied_for,
    }
}

/// Apply a wrong answer given on `today`.
///
/// Distinct-day progress (`correct_days`, `last_correct_date`) is kept.
pub fn process_wrong_answer(item: &ItemProgress, today: NaiveDate) -> ItemProgress {
    ItemProgress {
        score: item.score.saturating_sub(WRONG_PENALTY),
        interval_days: 1.0,
        next_review_at: next_review_after(today, 1.0),
        streak: 0,
        ..item.clone()
    }
}

/// Accelerating penalty for `days_overdue` days of neglect:
/// `floor(d * (1 + d / 10))`.
pub fn decay_amount(days_overdue: i64) -> u32 {
    if days_overdue <= 0 {
        return 0;
    }
    let d = days_overdue as u64;
    let amount = d + d * d / 10;
    u32::try_from(amount).unwrap_or(u32::MAX)
}

/// Decay the score of an overdue item.
///
/// Only `score` (and, for [`DecayPolicy::OncePerOverduePeriod`], the decay
/// marker) changes. Scores already at or below [`DECAY_FLOOR`] are left as
/// they are: decay never raises a score.
pub fn apply_decay(item: &ItemProgress, today: NaiveDate, policy: DecayPolicy) -> ItemProgress {
    let days_overdue = item.days_overdue(today);
    if days_overdue <= 0 {
        return item.clone();
    }

    if policy == DecayPolicy::OncePerOverduePeriod
        && item.decay_applied_for == Some(item.next_review_at)
    {
        return item.clone();
    }

    let score = if item.score <= DECAY_FLOOR {
        item.score
    } else {
        item.score
            .saturating_sub(decay_amount(days_overdue))
            .max(DECAY_FLOOR)
    };

    let mut decayed = item.clone();
    decayed.score = score;
    if policy == DecayPolicy::OncePerOverduePeriod {
        decayed.decay_applied_for = Some(item.next_review_at);
    }
    decayed
}

/// Due day for an interval starting on `today`; fractional intervals round up.
pub fn next_review_after(today: NaiveDate, interval_days: f64) -> NaiveDate {
    let days = interval_days.max(1.0).ceil() as u64;
    today.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn day(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .checked_add_days(Days::new(offset))
            .unwrap()
    }

    #[test]
    fn first_correct_answer() {
        let item = ItemProgress::new(day(0));
        let next = process_correct_answer(&item, day(0));

        assert_eq!(
            next,
            ItemProgress {
                score: 5,
                interval_days: 2.5,
                next_review_at: day(3),
                streak: 1,
                correct_days: 1,
                last_correct_date: Some(day(0)),
                decay_applied_for: None,
            }
        );
    }

    #[test]
    fn streak_bonus_uses_streak_before_answer() {
        let mut item = ItemProgress::new(day(0));
        item.streak = 3;
        item.score = 40;
        let next = process_correct_answer(&item, day(1));
        assert_eq!(next.score, 40 + 5 + 2 * 3);
        assert_eq!(next.streak, 4);
    }

    #[test]
    fn same_day_correct_answers_count_one_day() {
        let item = ItemProgress::new(day(0));
        let once = process_correct_answer(&item, day(0));
        let twice = process_correct_answer(&once, day(0));
        assert_eq!(twice.correct_days, 1);
        assert_eq!(twice.streak, 2);
    }

    #[test]
    fn learning_interval_caps_at_sixty() {
        let mut item = ItemProgress::new(day(0));
        item.interval_days = 40.0;
        let next = process_correct_answer(&item, day(0));
        assert_eq!(next.interval_days, 60.0);
        assert_eq!(next.next_review_at, day(60));
    }

    #[test]
    fn mastered_interval_has_thirty_day_floor_and_no_ceiling() {
        let mut item = ItemProgress::new(day(0));
        item.score = 100;
        item.correct_days = 9;
        item.interval_days = 2.0;
        item.last_correct_date = Some(day(0));
        let next = process_correct_answer(&item, day(1));
        assert!(next.is_mastered());
        assert_eq!(next.interval_days, 30.0);

        let mut long = next.clone();
        long.interval_days = 100.0;
        let after = process_correct_answer(&long, day(40));
        assert_eq!(after.interval_days, 250.0);
    }

    #[test]
    fn wrong_answer_resets_streak_and_interval() {
        let mut item = ItemProgress::new(day(0));
        item.score = 50;
        item.streak = 4;
        item.correct_days = 6;
        item.interval_days = 20.0;
        item.last_correct_date = Some(day(3));

        let next = process_wrong_answer(&item, day(5));
        assert_eq!(next.score, 35);
        assert_eq!(next.streak, 0);
        assert_eq!(next.interval_days, 1.0);
        assert_eq!(next.next_review_at, day(6));
        assert_eq!(next.correct_days, 6);
        assert_eq!(next.last_correct_date, Some(day(3)));
    }

    #[test]
    fn wrong_answer_floors_at_zero() {
        let mut item = ItemProgress::new(day(0));
        item.score = 10;
        assert_eq!(process_wrong_answer(&item, day(0)).score, 0);
    }

    #[test]
    fn three_correct_days_scenario() {
        let mut item = ItemProgress::new(day(0));
        let mut previous_score = item.score;
        for (n, offset) in [0u64, 3, 10].into_iter().enumerate() {
            let streak_before = item.streak;
            item = process_correct_answer(&item, day(offset));
            assert_eq!(item.score, previous_score + 5 + 2 * streak_before);
            assert!(item.score > previous_score);
            assert_eq!(item.correct_days, n as u32 + 1);
            previous_score = item.score;
        }
        assert_eq!(item.correct_days, 3);
        assert_eq!(item.score, 5 + 7 + 9);
    }

    #[test]
    fn decay_amount_accelerates() {
        assert_eq!(decay_amount(0), 0);
        assert_eq!(decay_amount(-4), 0);
        assert_eq!(decay_amount(1), 1);
        assert_eq!(decay_amount(5), 7);
        assert_eq!(decay_amount(10), 20);
        assert_eq!(decay_amount(30), 120);
    }

    #[test]
    fn decay_ignores_items_not_overdue() {
        let mut item = ItemProgress::new(day(0));
        item.score = 80;
        item.next_review_at = day(5);
        assert_eq!(apply_decay(&item, day(5), DecayPolicy::Compounding), item);
        assert_eq!(apply_decay(&item, day(2), DecayPolicy::Compounding), item);
    }

    #[test]
    fn decay_touches_only_score() {
        let mut item = ItemProgress::new(day(0));
        item.score = 80;
        item.streak = 2;
        item.correct_days = 4;
        item.interval_days = 6.0;
        let decayed = apply_decay(&item, day(10), DecayPolicy::Compounding);
        assert_eq!(decayed.score, 60);
        assert_eq!(
            decayed,
            ItemProgress {
                score: 60,
                ..item
            }
        );
    }

    #[test]
    fn decay_stops_at_floor() {
        let mut item = ItemProgress::new(day(0));
        item.score = 90;
        assert_eq!(apply_decay(&item, day(365), DecayPolicy::Compounding).score, 30);
    }

    #[test]
    fn decay_never_raises_low_scores() {
        let mut item = ItemProgress::new(day(0));
        item.score = 12;
        assert_eq!(apply_decay(&item, day(20), DecayPolicy::Compounding).score, 12);
    }

    #[test]
    fn compounding_decay_repeats_on_every_pass() {
        let mut item = ItemProgress::new(day(0));
        item.score = 90;
        let first = apply_decay(&item, day(5), DecayPolicy::Compounding);
        let second = apply_decay(&first, day(5), DecayPolicy::Compounding);
        assert_eq!(first.score, 83);
        assert_eq!(second.score, 76);
    }

    #[test]
    fn once_per_period_decay_applies_once_until_reviewed() {
        let mut item = ItemProgress::new(day(0));
        item.score = 90;
        let policy = DecayPolicy::OncePerOverduePeriod;

        let first = apply_decay(&item, day(5), policy);
        assert_eq!(first.score, 83);
        assert_eq!(first.decay_applied_for, Some(day(0)));

        let again = apply_decay(&first, day(9), policy);
        assert_eq!(again.score, 83);

        let reviewed = process_wrong_answer(&again, day(9));
        let next_period = apply_decay(&reviewed, day(13), policy);
        assert_eq!(next_period.score, reviewed.score.saturating_sub(3).max(30));
        assert_eq!(next_period.decay_applied_for, Some(day(10)));
    }

    #[test]
    fn huge_intervals_saturate_due_date() {
        assert_eq!(next_review_after(day(0), f64::INFINITY), NaiveDate::MAX);
        assert_eq!(next_review_after(day(0), 0.2), day(1));
    }

    #[test]
    fn fractional_intervals_round_up_to_whole_days() {
        assert_eq!(next_review_after(day(0), 2.5), day(3));
        assert_eq!(next_review_after(day(0), 6.25), day(7));
        assert_eq!(next_review_after(day(0), 15.0), day(15));
    }

    #[test]
    fn extreme_counters_saturate_instead_of_overflowing() {
        let mut item = ItemProgress::new(day(0));
        item.score = 50;
        item.streak = u32::MAX;
        item.correct_days = u32::MAX;

        let next = process_correct_answer(&item, day(1));
        assert_eq!(next.score, MAX_SCORE);
        assert_eq!(next.streak, u32::MAX);
        assert_eq!(next.correct_days, u32::MAX);
    }

    proptest! {
        #[test]
        fn answers_keep_score_and_interval_in_range(
            answers in proptest::collection::vec((any::<bool>(), 0u64..3), 0..80)
        ) {
            let mut item = ItemProgress::new(day(0));
            let mut offset = 0;
            for (correct, gap) in answers {
                offset += gap;
                let before = item.clone();
                item = if correct {
                    process_correct_answer(&item, day(offset))
                } else {
                    process_wrong_answer(&item, day(offset))
                };
                prop_assert!(item.score <= MAX_SCORE);
                prop_assert!(item.interval_days >= 1.0);
                prop_assert!(item.correct_days >= before.correct_days);
                if correct {
                    prop_assert!(item.streak > before.streak);
                } else {
                    prop_assert_eq!(item.streak, 0);
                    prop_assert_eq!(item.correct_days, before.correct_days);
                }
            }
        }

        #[test]
        fn decay_never_raises_and_respects_floor(
            score in 0u32..=100,
            overdue in 0u64..2000,
            compounding in any::<bool>(),
        ) {
            let mut item = ItemProgress::new(day(0));
            item.score = score;
            let policy = if compounding {
                DecayPolicy::Compounding
            } else {
                DecayPolicy::OncePerOverduePeriod
            };
            let decayed = apply_decay(&item, day(overdue), policy);
            prop_assert!(decayed.score <= score);
            if score >= DECAY_FLOOR {
                prop_assert!(decayed.score >= DECAY_FLOOR);
            }
        }
    }
}
