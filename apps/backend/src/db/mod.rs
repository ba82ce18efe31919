//! SQLite database operations

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

/// Blind upsert of one question's progress. The row is only rewritten when a
/// stored field differs, so re-delivering a batch keeps `updated_at` stable.
const UPSERT_QUESTION_PROGRESS: &str = r#"
    INSERT INTO question_progress (user_id, package_id, question_index, score, interval_days,
                                   next_review_date, streak, correct_days, last_correct_date, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (user_id, package_id, question_index) DO UPDATE SET
        score = excluded.score,
        interval_days = excluded.interval_days,
        next_review_date = excluded.next_review_date,
        streak = excluded.streak,
        correct_days = excluded.correct_days,
        last_correct_date = excluded.last_correct_date,
        updated_at = excluded.updated_at
    WHERE question_progress.score IS NOT excluded.score
       OR question_progress.interval_days IS NOT excluded.interval_days
       OR question_progress.next_review_date IS NOT excluded.next_review_date
       OR question_progress.streak IS NOT excluded.streak
       OR question_progress.correct_days IS NOT excluded.correct_days
       OR question_progress.last_correct_date IS NOT excluded.last_correct_date
"#;

/// Database wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database and create a connection pool.
    ///
    /// In-memory databases get a single connection that is never recycled,
    /// otherwise every new connection would see an empty database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(10)
                .connect_with(options)
                .await?
        };

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // === Token Repository ===

    /// Issue a fresh bearer token for a user
    pub async fn issue_token(&self, user_id: &str, ttl: Duration) -> Result<AuthToken> {
        let token = Uuid::new_v4().to_string();
        self.store_token(&token, user_id, Utc::now() + ttl).await
    }

    /// Store a token issued elsewhere
    pub async fn store_token(
        &self,
        token: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<AuthToken> {
        let token = sqlx::query_as::<_, AuthToken>(
            r#"
            INSERT INTO auth_tokens (token, user_id, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (token) DO UPDATE SET
                user_id = excluded.user_id,
                expires_at = excluded.expires_at
            RETURNING token, user_id, created_at, expires_at
            "#,
        )
        .bind(token)
        .bind(user_id)
        .bind(Utc::now())
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    /// Look up a token that has not expired at `now`
    pub async fn find_valid_token(&self, token: &str, now: DateTime<Utc>) -> Result<Option<AuthToken>> {
        let found = sqlx::query_as::<_, AuthToken>(
            r#"
            SELECT token, user_id, created_at, expires_at
            FROM auth_tokens
            WHERE token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.filter(|t| t.is_valid_at(now)))
    }

    // === Package Repository ===

    /// Register a package, or update its name and size
    pub async fn upsert_package(&self, uuid: &str, name: &str, questions_count: i64) -> Result<DbPackage> {
        let package = sqlx::query_as::<_, DbPackage>(
            r#"
            INSERT INTO packages (uuid, name, questions_count, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (uuid) DO UPDATE SET
                name = excluded.name,
                questions_count = excluded.questions_count
            RETURNING id, uuid, name, questions_count, created_at
            "#,
        )
        .bind(uuid)
        .bind(name)
        .bind(questions_count)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(package)
    }

    pub async fn get_package_by_uuid(&self, uuid: &str) -> Result<Option<DbPackage>> {
        let package = sqlx::query_as::<_, DbPackage>(
            r#"
            SELECT id, uuid, name, questions_count, created_at
            FROM packages
            WHERE uuid = ?
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(package)
    }

    // === Question Progress Repository ===

    /// Store one question's progress, overwriting whatever was there
    pub async fn upsert_question_progress(
        &self,
        user_id: &str,
        package_id: i64,
        entry: &QuestionProgress,
        now: DateTime<Utc>,
    ) -> Result<()> {
        bind_question_progress(sqlx::query(UPSERT_QUESTION_PROGRESS), user_id, package_id, entry, now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store a batch of entries in one transaction; returns how many were written
    pub async fn upsert_question_progress_batch(
        &self,
        user_id: &str,
        package_id: i64,
        entries: &[QuestionProgress],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            bind_question_progress(sqlx::query(UPSERT_QUESTION_PROGRESS), user_id, package_id, entry, now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(entries.len())
    }

    pub async fn get_question_progress(&self, user_id: &str, package_id: i64) -> Result<Vec<DbQuestionProgress>> {
        let rows = sqlx::query_as::<_, DbQuestionProgress>(
            r#"
            SELECT user_id, package_id, question_index, score, interval_days, next_review_date,
                   streak, correct_days, last_correct_date, updated_at
            FROM question_progress
            WHERE user_id = ? AND package_id = ?
            ORDER BY question_index
            "#,
        )
        .bind(user_id)
        .bind(package_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Every package the user has progress on, with that progress
    pub async fn get_packages_with_progress(
        &self,
        user_id: &str,
    ) -> Result<Vec<(DbPackage, Vec<DbQuestionProgress>)>> {
        let packages = sqlx::query_as::<_, DbPackage>(
            r#"
            SELECT p.id, p.uuid, p.name, p.questions_count, p.created_at
            FROM packages p
            WHERE EXISTS (
                SELECT 1 FROM question_progress q
                WHERE q.package_id = p.id AND q.user_id = ?
            )
            ORDER BY p.name, p.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, DbQuestionProgress>(
            r#"
            SELECT user_id, package_id, question_index, score, interval_days, next_review_date,
                   streak, correct_days, last_correct_date, updated_at
            FROM question_progress
            WHERE user_id = ?
            ORDER BY package_id, question_index
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_package: HashMap<i64, Vec<DbQuestionProgress>> = HashMap::new();
        for row in rows {
            by_package.entry(row.package_id).or_default().push(row);
        }

        Ok(packages
            .into_iter()
            .map(|p| {
                let progress = by_package.remove(&p.id).unwrap_or_default();
                (p, progress)
            })
            .collect())
    }

    // === Package Progress Repository ===

    /// Fold a finished session into the user's aggregate for a package.
    ///
    /// Best score is a running maximum, attempts and time accumulate, the
    /// last score and play time are replaced.
    pub async fn merge_package_progress(
        &self,
        user_id: &str,
        package_id: i64,
        session: &SaveProgressRequest,
        now: DateTime<Utc>,
    ) -> Result<DbPackageProgress> {
        let played_at = session.completed_at.unwrap_or(now);
        let time_spent = i64::try_from(session.time_spent).unwrap_or(i64::MAX);

        let merged = sqlx::query_as::<_, DbPackageProgress>(
            r#"
            INSERT INTO package_progress (user_id, package_id, last_score, best_score, attempts,
                                          total_time_spent, total_questions, last_played_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?)
            ON CONFLICT (user_id, package_id) DO UPDATE SET
                last_score = excluded.last_score,
                best_score = MAX(package_progress.best_score, excluded.best_score),
                attempts = package_progress.attempts + 1,
                total_time_spent = package_progress.total_time_spent + excluded.total_time_spent,
                total_questions = excluded.total_questions,
                last_played_at = excluded.last_played_at,
                updated_at = excluded.updated_at
            RETURNING user_id, package_id, last_score, best_score, attempts,
                      total_time_spent, total_questions, last_played_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(package_id)
        .bind(i64::from(session.score))
        .bind(i64::from(session.score))
        .bind(time_spent)
        .bind(i64::from(session.total_questions))
        .bind(played_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(merged)
    }

    pub async fn get_package_progress(&self, user_id: &str, package_id: i64) -> Result<Option<DbPackageProgress>> {
        let progress = sqlx::query_as::<_, DbPackageProgress>(
            r#"
            SELECT user_id, package_id, last_score, best_score, attempts,
                   total_time_spent, total_questions, last_played_at, updated_at
            FROM package_progress
            WHERE user_id = ? AND package_id = ?
            "#,
        )
        .bind(user_id)
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(progress)
    }
}

fn bind_question_progress<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    user_id: &'q str,
    package_id: i64,
    entry: &QuestionProgress,
    now: DateTime<Utc>,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(user_id)
        .bind(package_id)
        .bind(entry.question_index)
        .bind(i64::from(entry.score))
        .bind(entry.interval_days)
        .bind(entry.next_review_date)
        .bind(i64::from(entry.streak))
        .bind(i64::from(entry.correct_days))
        .bind(entry.last_correct_date)
        .bind(now)
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}
