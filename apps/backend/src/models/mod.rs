//! Database models and API types

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::FromRow;

// Re-export wire types from memora-core
pub use memora_core::sync::{
    AllQuestionProgressResponse, GetProgressResponse, PackageProgress, PackageQuestionProgress,
    QuestionProgress, QuestionProgressResponse, SaveProgressRequest, SaveProgressResponse,
    SyncQuestionProgressResponse,
};

// === Database Entity Types ===

/// Bearer token row
#[derive(Debug, Clone, FromRow)]
pub struct AuthToken {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Published package
#[derive(Debug, Clone, FromRow)]
pub struct DbPackage {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub questions_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Per-question progress row
#[derive(Debug, Clone, FromRow)]
pub struct DbQuestionProgress {
    pub user_id: String,
    pub package_id: i64,
    pub question_index: i64,
    pub score: i64,
    pub interval_days: f64,
    pub next_review_date: NaiveDate,
    pub streak: i64,
    pub correct_days: i64,
    pub last_correct_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl DbQuestionProgress {
    /// Convert to the wire type
    pub fn to_api(&self) -> QuestionProgress {
        QuestionProgress {
            question_index: self.question_index,
            score: clamp_u32(self.score),
            interval_days: self.interval_days,
            next_review_date: self.next_review_date,
            streak: clamp_u32(self.streak),
            correct_days: clamp_u32(self.correct_days),
            last_correct_date: self.last_correct_date,
        }
    }
}

/// Per-package aggregate row
#[derive(Debug, Clone, FromRow)]
pub struct DbPackageProgress {
    pub user_id: String,
    pub package_id: i64,
    pub last_score: i64,
    pub best_score: i64,
    pub attempts: i64,
    pub total_time_spent: i64,
    pub total_questions: i64,
    pub last_played_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbPackageProgress {
    /// Convert to the wire type
    pub fn to_api(&self, package_uuid: &str) -> PackageProgress {
        PackageProgress {
            package_uuid: package_uuid.to_string(),
            last_score: clamp_u32(self.last_score),
            best_score: clamp_u32(self.best_score),
            attempts: clamp_u32(self.attempts),
            total_time_spent: u64::try_from(self.total_time_spent).unwrap_or(0),
            total_questions: clamp_u32(self.total_questions),
            last_played_at: self.last_played_at,
        }
    }
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

// === API Request Types ===

/// Body of `POST /api/sync-question-progress` as received.
///
/// `progress` stays untyped so one malformed entry cannot reject the batch.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQuestionProgressBody {
    pub package_uuid: String,
    #[serde(default)]
    pub progress: serde_json::Value,
}

/// `?packageUuid=` query
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageQuery {
    pub package_uuid: String,
}
