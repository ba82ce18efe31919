//! Test fixtures and factory functions for request bodies.

use serde_json::{json, Value};

/// One wire progress entry.
pub fn progress_entry(question_index: i64, score: u32, next_review_date: &str) -> Value {
    json!({
        "questionIndex": question_index,
        "score": score,
        "intervalDays": 2.5,
        "nextReviewDate": next_review_date,
        "streak": 1,
        "correctDays": 1,
        "lastCorrectDate": "2024-05-01"
    })
}

/// `sync-question-progress` body for `count` sequential questions.
pub fn sync_request(package_uuid: &str, count: i64) -> Value {
    let progress: Vec<Value> = (0..count)
        .map(|i| progress_entry(i, 10 * i as u32, "2024-05-04"))
        .collect();
    json!({
        "packageUuid": package_uuid,
        "progress": progress
    })
}

/// `save-progress` body for one finished session.
pub fn save_progress_request(package_uuid: &str, score: u32, time_spent: u64) -> Value {
    json!({
        "packageUuid": package_uuid,
        "score": score,
        "totalQuestions": 10,
        "completedAt": "2024-05-01T10:00:00Z",
        "timeSpent": time_spent
    })
}
