//! Wire types of the progress-synchronization protocol.
//!
//! Two record families travel between client and server:
//! per-question progress, which the server stores by blind upsert, and
//! per-package session aggregates, which the server merges.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::dates::{day, optional_day, optional_timestamp};
use crate::error::{CoreError, Result};
use crate::types::{ItemProgress, MAX_SCORE};

/// Upper bound for `streak` and `correctDays` accepted from the wire.
pub const MAX_PROGRESS_COUNTER: u32 = 100_000;

fn default_interval() -> f64 {
    1.0
}

/// serde adapter reading any integer that fits `i64` and clamping it into `u32`.
mod clamped_count {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Ok(u32::try_from(raw.max(0)).unwrap_or(u32::MAX))
    }
}

/// Progress of one question of a remote package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionProgress {
    pub question_index: i64,
    #[serde(default, with = "clamped_count")]
    pub score: u32,
    #[serde(default = "default_interval")]
    pub interval_days: f64,
    #[serde(with = "day")]
    pub next_review_date: NaiveDate,
    #[serde(default, with = "clamped_count")]
    pub streak: u32,
    #[serde(default, with = "clamped_count")]
    pub correct_days: u32,
    #[serde(default, with = "optional_day")]
    pub last_correct_date: Option<NaiveDate>,
}

impl QuestionProgress {
    pub fn from_item(question_index: i64, item: &ItemProgress) -> Self {
        Self {
            question_index,
            score: item.score,
            interval_days: item.interval_days,
            next_review_date: item.next_review_at,
            streak: item.streak,
            correct_days: item.correct_days,
            last_correct_date: item.last_correct_date,
        }
    }

    /// Local record for this question. The decay marker is local-only and starts empty.
    pub fn to_item(&self) -> ItemProgress {
        ItemProgress {
            score: self.score,
            interval_days: self.interval_days,
            next_review_at: self.next_review_date,
            streak: self.streak,
            correct_days: self.correct_days,
            last_correct_date: self.last_correct_date,
            decay_applied_for: None,
        }
    }

    /// Reject entries that cannot address a question; clamp values into range.
    ///
    /// `questions_count` of zero means the package size is unknown.
    pub fn validated(mut self, questions_count: i64) -> Result<Self> {
        if self.question_index < 0 || (questions_count > 0 && self.question_index >= questions_count) {
            return Err(CoreError::InvalidQuestionIndex(self.question_index));
        }
        self.score = self.score.min(MAX_SCORE);
        self.streak = self.streak.min(MAX_PROGRESS_COUNTER);
        self.correct_days = self.correct_days.min(MAX_PROGRESS_COUNTER);
        if !self.interval_days.is_finite() || self.interval_days < 1.0 {
            self.interval_days = 1.0;
        }
        Ok(self)
    }
}

/// Body of `POST sync-question-progress`, as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQuestionProgressRequest {
    pub package_uuid: String,
    pub progress: Vec<QuestionProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQuestionProgressResponse {
    pub success: bool,
    pub synced_count: usize,
}

/// Response of `GET get-question-progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionProgressResponse {
    pub package_uuid: String,
    pub progress: Vec<QuestionProgress>,
    /// Latest server-side update among the returned rows.
    pub last_sync: Option<DateTime<Utc>>,
}

/// One package of `GET get-all-question-progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageQuestionProgress {
    pub package_uuid: String,
    pub package_name: String,
    pub questions_count: i64,
    pub progress: Vec<QuestionProgress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllQuestionProgressResponse {
    pub packages: Vec<PackageQuestionProgress>,
}

/// Body of `POST save-progress`: the outcome of one finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveProgressRequest {
    pub package_uuid: String,
    pub score: u32,
    #[serde(default)]
    pub total_questions: u32,
    #[serde(default, with = "optional_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Seconds spent in the session.
    #[serde(default)]
    pub time_spent: u64,
}

/// Aggregate progress of one user on one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageProgress {
    pub package_uuid: String,
    pub last_score: u32,
    pub best_score: u32,
    pub attempts: u32,
    pub total_time_spent: u64,
    pub total_questions: u32,
    pub last_played_at: DateTime<Utc>,
}

impl PackageProgress {
    /// Fold a finished session into the aggregate.
    ///
    /// Best score is a running maximum, attempts and time accumulate, and the
    /// last score and play time are replaced.
    pub fn merge(existing: Option<&PackageProgress>, session: &SaveProgressRequest, played_at: DateTime<Utc>) -> Self {
        let last_played_at = session.completed_at.unwrap_or(played_at);
        match existing {
            Some(prev) => Self {
                package_uuid: prev.package_uuid.clone(),
                last_score: session.score,
                best_score: prev.best_score.max(session.score),
                attempts: prev.attempts + 1,
                total_time_spent: prev.total_time_spent + session.time_spent,
                total_questions: session.total_questions,
                last_played_at,
            },
            None => Self {
                package_uuid: session.package_uuid.clone(),
                last_score: session.score,
                best_score: session.score,
                attempts: 1,
                total_time_spent: session.time_spent,
                total_questions: session.total_questions,
                last_played_at,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveProgressResponse {
    pub success: bool,
    pub progress: PackageProgress,
}

/// Response of `GET get-progress`: `{"found": false}` when nothing is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetProgressResponse {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<PackageProgress>,
}
