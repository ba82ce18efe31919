//! Repository pattern for database access.

use crate::config::LocalSettings;
use crate::db::error::DbError;
use chrono::{DateTime, NaiveDate, Utc};
use memora_core::sync::QuestionProgress;
use memora_core::{DecayPolicy, ItemProgress, Reviewable};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

type Result<T> = std::result::Result<T, DbError>;

const PROGRESS_COLUMNS: &str = "owner_id, item_id, score, interval_days, next_review_at, streak, \
     correct_days, last_correct_date, decay_applied_for, dirty, revision";

/// True when an upsert changes any field that is synchronized with the server.
const SYNCED_FIELDS_CHANGED: &str = "item_progress.score IS NOT excluded.score \
     OR item_progress.interval_days IS NOT excluded.interval_days \
     OR item_progress.next_review_at IS NOT excluded.next_review_at \
     OR item_progress.streak IS NOT excluded.streak \
     OR item_progress.correct_days IS NOT excluded.correct_days \
     OR item_progress.last_correct_date IS NOT excluded.last_correct_date";

/// A remote package known to this device.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LocalPackage {
    pub uuid: String,
    pub name: String,
    pub questions_count: i64,
}

/// Item progress as stored locally, with its sync bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProgress {
    pub owner_id: String,
    pub item_id: i64,
    pub progress: ItemProgress,
    /// Changed since the last successful push.
    pub dirty: bool,
    /// Bumped on every local change to a synced field.
    pub revision: i64,
}

impl Reviewable for StoredProgress {
    fn progress(&self) -> &ItemProgress {
        &self.progress
    }
}

/// Package statistics.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PackageStats {
    pub total_items: usize,
    pub due_items: usize,
    pub mastered_items: usize,
    pub average_score: f64,
}

/// Result of reconciling pulled records with the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteApplyStats {
    pub applied: usize,
    /// Remote records ignored because the local copy has unpushed changes.
    pub kept_local: usize,
}

/// Stored account info.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AccountInfo {
    pub token: String,
    pub user_id: Option<String>,
}

/// Repository for package operations.
pub trait PackageRepository {
    fn upsert_package(&self, package: &LocalPackage) -> Result<()>;
    fn get_package(&self, uuid: &str) -> Result<Option<LocalPackage>>;
    fn list_packages(&self) -> Result<Vec<LocalPackage>>;
    fn delete_package(&self, uuid: &str) -> Result<bool>;
    fn package_stats(&self, uuid: &str, today: NaiveDate) -> Result<PackageStats>;
}

/// Repository for item progress operations.
pub trait ProgressRepository {
    /// Create the default record for an item unless one exists; returns the stored record.
    fn add_item(&self, owner_id: &str, item_id: i64, today: NaiveDate) -> Result<ItemProgress>;
    fn get_item_progress(&self, owner_id: &str, item_id: i64) -> Result<Option<ItemProgress>>;
    fn list_item_progress(&self, owner_id: &str) -> Result<Vec<StoredProgress>>;
    fn all_item_progress(&self) -> Result<Vec<StoredProgress>>;
    /// Store a local change; the item becomes dirty if a synced field changed.
    fn save_item_progress(&self, owner_id: &str, item_id: i64, progress: &ItemProgress) -> Result<()>;
    fn delete_item(&self, owner_id: &str, item_id: i64) -> Result<bool>;
    fn dirty_items(&self, owner_id: &str) -> Result<Vec<StoredProgress>>;
    /// Clear the dirty flag of pushed items, unless they changed again since (revision mismatch).
    fn mark_items_synced(&self, owner_id: &str, pushed: &[(i64, i64)]) -> Result<usize>;
    /// Overwrite clean local records with pulled ones; dirty records are kept.
    fn apply_remote_progress(&self, owner_id: &str, remote: &[QuestionProgress]) -> Result<RemoteApplyStats>;
}

/// Repository for settings operations.
pub trait SettingsRepository {
    fn get_settings(&self) -> Result<LocalSettings>;
    fn save_settings(&self, settings: &LocalSettings) -> Result<()>;
}

/// Repository for the signed-in account.
pub trait AccountRepository {
    fn get_account(&self) -> Result<Option<AccountInfo>>;
    fn save_account(&self, token: &str, user_id: Option<&str>) -> Result<()>;
    fn clear_account(&self) -> Result<()>;
}

/// Repository for per-package sync metadata.
pub trait SyncStateRepository {
    fn get_last_sync(&self, package_uuid: &str) -> Result<Option<DateTime<Utc>>>;
    fn set_last_sync(&self, package_uuid: &str, at: DateTime<Utc>) -> Result<()>;
}

/// SQLite implementation of repositories.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open database at path, creating if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(super::schema::SCHEMA)?;
        self.conn.execute_batch(super::schema::INIT_SETTINGS)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![super::schema::SCHEMA_VERSION],
        )?;
        Ok(())
    }

    fn row_to_progress(row: &rusqlite::Row) -> rusqlite::Result<StoredProgress> {
        Ok(StoredProgress {
            owner_id: row.get(0)?,
            item_id: row.get(1)?,
            progress: ItemProgress {
                score: row.get(2)?,
                interval_days: row.get(3)?,
                next_review_at: row.get(4)?,
                streak: row.get(5)?,
                correct_days: row.get(6)?,
                last_correct_date: row.get(7)?,
                decay_applied_for: row.get(8)?,
            },
            dirty: row.get(9)?,
            revision: row.get(10)?,
        })
    }

    fn query_progress(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<StoredProgress>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, Self::row_to_progress)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl PackageRepository for SqliteRepository {
    fn upsert_package(&self, package: &LocalPackage) -> Result<()> {
        self.conn.execute(
            "INSERT INTO packages (uuid, name, questions_count, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (uuid) DO UPDATE SET name = excluded.name, questions_count = excluded.questions_count",
            params![package.uuid, package.name, package.questions_count, Utc::now()],
        )?;
        Ok(())
    }

    fn get_package(&self, uuid: &str) -> Result<Option<LocalPackage>> {
        self.conn
            .query_row(
                "SELECT uuid, name, questions_count FROM packages WHERE uuid = ?1",
                params![uuid],
                |row| {
                    Ok(LocalPackage {
                        uuid: row.get(0)?,
                        name: row.get(1)?,
                        questions_count: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    fn list_packages(&self) -> Result<Vec<LocalPackage>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, name, questions_count FROM packages ORDER BY name, uuid")?;
        let packages = stmt
            .query_map([], |row| {
                Ok(LocalPackage {
                    uuid: row.get(0)?,
                    name: row.get(1)?,
                    questions_count: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(packages)
    }

    /// Deleting a package deletes its progress records and sync metadata.
    fn delete_package(&self, uuid: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM item_progress WHERE owner_id = ?1", params![uuid])?;
        tx.execute("DELETE FROM sync_state WHERE package_uuid = ?1", params![uuid])?;
        let deleted = tx.execute("DELETE FROM packages WHERE uuid = ?1", params![uuid])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn package_stats(&self, uuid: &str, today: NaiveDate) -> Result<PackageStats> {
        if self.get_package(uuid)?.is_none() {
            return Err(DbError::PackageNotFound(uuid.to_string()));
        }

        let items = self.list_item_progress(uuid)?;
        let total_items = items.len();
        let due_items = items.iter().filter(|i| i.progress.is_due(today)).count();
        let mastered_items = items.iter().filter(|i| i.progress.is_mastered()).count();
        let average_score = if total_items == 0 {
            0.0
        } else {
            items.iter().map(|i| f64::from(i.progress.score)).sum::<f64>() / total_items as f64
        };

        Ok(PackageStats {
            total_items,
            due_items,
            mastered_items,
            average_score,
        })
    }
}

impl ProgressRepository for SqliteRepository {
    fn add_item(&self, owner_id: &str, item_id: i64, today: NaiveDate) -> Result<ItemProgress> {
        let fresh = ItemProgress::new(today);
        self.conn.execute(
            "INSERT OR IGNORE INTO item_progress (owner_id, item_id, score, interval_days, next_review_at, streak, correct_days)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                owner_id,
                item_id,
                fresh.score,
                fresh.interval_days,
                fresh.next_review_at,
                fresh.streak,
                fresh.correct_days,
            ],
        )?;

        self.get_item_progress(owner_id, item_id)?
            .ok_or_else(|| DbError::ItemNotFound {
                owner_id: owner_id.to_string(),
                item_id,
            })
    }

    fn get_item_progress(&self, owner_id: &str, item_id: i64) -> Result<Option<ItemProgress>> {
        self.conn
            .query_row(
                &format!("SELECT {PROGRESS_COLUMNS} FROM item_progress WHERE owner_id = ?1 AND item_id = ?2"),
                params![owner_id, item_id],
                Self::row_to_progress,
            )
            .optional()
            .map(|stored| stored.map(|s| s.progress))
            .map_err(Into::into)
    }

    fn list_item_progress(&self, owner_id: &str) -> Result<Vec<StoredProgress>> {
        self.query_progress(
            &format!("SELECT {PROGRESS_COLUMNS} FROM item_progress WHERE owner_id = ?1 ORDER BY item_id"),
            params![owner_id],
        )
    }

    fn all_item_progress(&self) -> Result<Vec<StoredProgress>> {
        self.query_progress(
            &format!("SELECT {PROGRESS_COLUMNS} FROM item_progress ORDER BY owner_id, item_id"),
            [],
        )
    }

    fn save_item_progress(&self, owner_id: &str, item_id: i64, progress: &ItemProgress) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO item_progress ({PROGRESS_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, 1)
                 ON CONFLICT (owner_id, item_id) DO UPDATE SET
                     dirty = CASE WHEN {SYNCED_FIELDS_CHANGED} THEN 1 ELSE item_progress.dirty END,
                     revision = CASE WHEN {SYNCED_FIELDS_CHANGED} THEN item_progress.revision + 1 ELSE item_progress.revision END,
                     score = excluded.score,
                     interval_days = excluded.interval_days,
                     next_review_at = excluded.next_review_at,
                     streak = excluded.streak,
                     correct_days = excluded.correct_days,
                     last_correct_date = excluded.last_correct_date,
                     decay_applied_for = excluded.decay_applied_for"
            ),
            params![
                owner_id,
                item_id,
                progress.score,
                progress.interval_days,
                progress.next_review_at,
                progress.streak,
                progress.correct_days,
                progress.last_correct_date,
                progress.decay_applied_for,
            ],
        )?;
        Ok(())
    }

    fn delete_item(&self, owner_id: &str, item_id: i64) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM item_progress WHERE owner_id = ?1 AND item_id = ?2",
            params![owner_id, item_id],
        )?;
        Ok(deleted > 0)
    }

    fn dirty_items(&self, owner_id: &str) -> Result<Vec<StoredProgress>> {
        self.query_progress(
            &format!(
                "SELECT {PROGRESS_COLUMNS} FROM item_progress WHERE owner_id = ?1 AND dirty = 1 ORDER BY item_id"
            ),
            params![owner_id],
        )
    }

    fn mark_items_synced(&self, owner_id: &str, pushed: &[(i64, i64)]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut cleared = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE item_progress SET dirty = 0 WHERE owner_id = ?1 AND item_id = ?2 AND revision = ?3",
            )?;
            for (item_id, revision) in pushed {
                cleared += stmt.execute(params![owner_id, item_id, revision])?;
            }
        }
        tx.commit()?;
        Ok(cleared)
    }

    fn apply_remote_progress(&self, owner_id: &str, remote: &[QuestionProgress]) -> Result<RemoteApplyStats> {
        let tx = self.conn.unchecked_transaction()?;
        let mut stats = RemoteApplyStats::default();
        {
            // The decay marker survives only while the due day is unchanged
            let mut stmt = tx.prepare(
                "INSERT INTO item_progress (owner_id, item_id, score, interval_days, next_review_at, streak,
                                            correct_days, last_correct_date, dirty, revision)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0)
                 ON CONFLICT (owner_id, item_id) DO UPDATE SET
                     score = excluded.score,
                     interval_days = excluded.interval_days,
                     next_review_at = excluded.next_review_at,
                     streak = excluded.streak,
                     correct_days = excluded.correct_days,
                     last_correct_date = excluded.last_correct_date,
                     decay_applied_for = CASE WHEN item_progress.next_review_at IS excluded.next_review_at
                                              THEN item_progress.decay_applied_for ELSE NULL END
                 WHERE item_progress.dirty = 0",
            )?;
            for entry in remote {
                let changed = stmt.execute(params![
                    owner_id,
                    entry.question_index,
                    entry.score,
                    entry.interval_days,
                    entry.next_review_date,
                    entry.streak,
                    entry.correct_days,
                    entry.last_correct_date,
                ])?;
                if changed > 0 {
                    stats.applied += 1;
                } else {
                    stats.kept_local += 1;
                }
            }
        }
        tx.commit()?;
        Ok(stats)
    }
}

impl SettingsRepository for SqliteRepository {
    fn get_settings(&self) -> Result<LocalSettings> {
        self.conn
            .query_row(
                "SELECT daily_reset_hour, review_batch_size, decay_policy FROM settings WHERE id = 1",
                [],
                |row| {
                    let decay_policy: String = row.get(2)?;
                    Ok(LocalSettings {
                        daily_reset_hour: row.get(0)?,
                        review_batch_size: row.get(1)?,
                        decay_policy: DecayPolicy::from_str(&decay_policy).unwrap_or_default(),
                    })
                },
            )
            .map_err(Into::into)
    }

    fn save_settings(&self, settings: &LocalSettings) -> Result<()> {
        if settings.daily_reset_hour > 23 {
            return Err(DbError::InvalidData(format!(
                "daily_reset_hour out of range: {}",
                settings.daily_reset_hour
            )));
        }

        self.conn.execute(
            "UPDATE settings SET daily_reset_hour = ?1, review_batch_size = ?2, decay_policy = ?3 WHERE id = 1",
            params![
                settings.daily_reset_hour,
                settings.review_batch_size,
                settings.decay_policy.as_str(),
            ],
        )?;
        Ok(())
    }
}

impl AccountRepository for SqliteRepository {
    fn get_account(&self) -> Result<Option<AccountInfo>> {
        self.conn
            .query_row("SELECT token, user_id FROM account WHERE id = 1", [], |row| {
                Ok(AccountInfo {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                })
            })
            .optional()
            .map_err(Into::into)
    }

    fn save_account(&self, token: &str, user_id: Option<&str>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO account (id, token, user_id) VALUES (1, ?1, ?2)
             ON CONFLICT (id) DO UPDATE SET token = excluded.token, user_id = excluded.user_id",
            params![token, user_id],
        )?;
        Ok(())
    }

    fn clear_account(&self) -> Result<()> {
        self.conn.execute("DELETE FROM account", [])?;
        Ok(())
    }
}

impl SyncStateRepository for SqliteRepository {
    fn get_last_sync(&self, package_uuid: &str) -> Result<Option<DateTime<Utc>>> {
        let last_sync: Option<Option<DateTime<Utc>>> = self
            .conn
            .query_row(
                "SELECT last_sync_at FROM sync_state WHERE package_uuid = ?1",
                params![package_uuid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(last_sync.flatten())
    }

    fn set_last_sync(&self, package_uuid: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_state (package_uuid, last_sync_at) VALUES (?1, ?2)
             ON CONFLICT (package_uuid) DO UPDATE SET last_sync_at = excluded.last_sync_at",
            params![package_uuid, at],
        )?;
        Ok(())
    }
}
