//! Core types for the spaced-repetition engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Upper bound of the item score scale.
pub const MAX_SCORE: u32 = 100;

/// Distinct correct days required (together with a full score) for mastery.
pub const MASTERY_CORRECT_DAYS: u32 = 10;

/// Learning state of a single memorized item.
///
/// All dates are calendar days: due checks, day-count increments and decay
/// are computed at day granularity, so the time-of-day is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemProgress {
    /// Strength of the item, `0..=100`.
    pub score: u32,
    /// Days until the next scheduled review, always `>= 1`.
    pub interval_days: f64,
    /// Day on which the item becomes due.
    pub next_review_at: NaiveDate,
    /// Consecutive correct answers since the last miss.
    pub streak: u32,
    /// Number of distinct days with at least one correct answer.
    pub correct_days: u32,
    /// Day of the most recent correct answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_correct_date: Option<NaiveDate>,
    /// Due day that a [`DecayPolicy::OncePerOverduePeriod`] pass last decayed against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay_applied_for: Option<NaiveDate>,
}

impl ItemProgress {
    /// Fresh record for an item added on `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            score: 0,
            interval_days: 1.0,
            next_review_at: today,
            streak: 0,
            correct_days: 0,
            last_correct_date: None,
            decay_applied_for: None,
        }
    }

    /// Mastered items have a full score and enough distinct correct days.
    pub fn is_mastered(&self) -> bool {
        is_mastered(self.score, self.correct_days)
    }

    /// Whether the item is due on `today`.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        today >= self.next_review_at
    }

    /// Whole days elapsed since the item became due (negative when not yet due).
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        (today - self.next_review_at).num_days()
    }
}

/// Mastery is derived, never stored.
pub fn is_mastered(score: u32, correct_days: u32) -> bool {
    correct_days >= MASTERY_CORRECT_DAYS && score >= MAX_SCORE
}

/// Anything that carries an [`ItemProgress`] and can be put in a review set.
pub trait Reviewable {
    fn progress(&self) -> &ItemProgress;
}

impl Reviewable for ItemProgress {
    fn progress(&self) -> &ItemProgress {
        self
    }
}

impl<T: Reviewable> Reviewable for &T {
    fn progress(&self) -> &ItemProgress {
        (*self).progress()
    }
}

/// How repeated decay passes treat an item that stays overdue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayPolicy {
    /// Every pass subtracts the full decay amount from the current score,
    /// so repeated passes before the next review compound.
    Compounding,
    /// Decay is applied once per overdue period; later passes are no-ops
    /// until the item is reviewed and becomes due again.
    OncePerOverduePeriod,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self::Compounding
    }
}

impl DecayPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compounding => "compounding",
            Self::OncePerOverduePeriod => "once_per_overdue_period",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "compounding" => Some(Self::Compounding),
            "once_per_overdue_period" => Some(Self::OncePerOverduePeriod),
            _ => None,
        }
    }
}
