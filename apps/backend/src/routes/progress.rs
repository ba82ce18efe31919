//! Progress sync endpoints

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::routes::auth::AuthenticatedUser;
use crate::AppState;

/// POST /api/sync-question-progress
pub async fn sync_question_progress(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(payload): Json<SyncQuestionProgressBody>,
) -> Result<Json<SyncQuestionProgressResponse>> {
    let package = find_package(&state, &payload.package_uuid).await?;
    let entries = parse_progress_entries(payload.progress, package.questions_count);

    let synced_count = state
        .db
        .upsert_question_progress_batch(&auth.user_id, package.id, &entries, Utc::now())
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        package = %package.uuid,
        synced_count,
        "question progress synced"
    );

    Ok(Json(SyncQuestionProgressResponse {
        success: true,
        synced_count,
    }))
}

/// GET /api/get-question-progress
pub async fn get_question_progress(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(query): Query<PackageQuery>,
) -> Result<Json<QuestionProgressResponse>> {
    let package = find_package(&state, &query.package_uuid).await?;
    let rows = state.db.get_question_progress(&auth.user_id, package.id).await?;

    let last_sync = rows.iter().map(|r| r.updated_at).max();

    Ok(Json(QuestionProgressResponse {
        package_uuid: package.uuid,
        progress: rows.iter().map(|r| r.to_api()).collect(),
        last_sync,
    }))
}

/// GET /api/get-all-question-progress
pub async fn get_all_question_progress(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<AllQuestionProgressResponse>> {
    let packages = state.db.get_packages_with_progress(&auth.user_id).await?;

    Ok(Json(AllQuestionProgressResponse {
        packages: packages
            .into_iter()
            .map(|(package, rows)| PackageQuestionProgress {
                package_uuid: package.uuid,
                package_name: package.name,
                questions_count: package.questions_count,
                progress: rows.iter().map(|r| r.to_api()).collect(),
            })
            .collect(),
    }))
}

/// POST /api/save-progress
pub async fn save_progress(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(payload): Json<SaveProgressRequest>,
) -> Result<Json<SaveProgressResponse>> {
    let package = find_package(&state, &payload.package_uuid).await?;

    let merged = state
        .db
        .merge_package_progress(&auth.user_id, package.id, &payload, Utc::now())
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        package = %package.uuid,
        attempts = merged.attempts,
        "session progress saved"
    );

    Ok(Json(SaveProgressResponse {
        success: true,
        progress: merged.to_api(&package.uuid),
    }))
}

/// GET /api/get-progress
pub async fn get_progress(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(query): Query<PackageQuery>,
) -> Result<Json<GetProgressResponse>> {
    let package = find_package(&state, &query.package_uuid).await?;
    let progress = state.db.get_package_progress(&auth.user_id, package.id).await?;

    Ok(Json(GetProgressResponse {
        found: progress.is_some(),
        progress: progress.map(|p| p.to_api(&package.uuid)),
    }))
}

async fn find_package(state: &AppState, package_uuid: &str) -> Result<DbPackage> {
    state
        .db
        .get_package_by_uuid(package_uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Package {}", package_uuid)))
}

/// Decode the `progress` field of a sync request, item by item.
///
/// Accepts a JSON array or a string holding one. Entries that do not decode
/// or address no question are dropped with a warning; the rest are clamped.
pub fn parse_progress_entries(progress: Value, questions_count: i64) -> Vec<QuestionProgress> {
    let items = match progress {
        Value::Array(items) => items,
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            _ => {
                tracing::warn!("progress string does not hold a JSON array, nothing to sync");
                return Vec::new();
            }
        },
        other => {
            tracing::warn!(kind = json_kind(&other), "progress is not an array, nothing to sync");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let entry = match serde_json::from_value::<QuestionProgress>(item) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(position, error = %e, "skipping malformed progress entry");
                    return None;
                }
            };
            match entry.validated(questions_count) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(position, error = %e, "skipping progress entry");
                    None
                }
            }
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
