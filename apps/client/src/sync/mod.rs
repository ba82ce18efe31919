//! Sync engine for progress synchronization.
//!
//! Pulls run when a package is opened, pushes when a session ends. Both are
//! best effort: a rejected token skips the cycle, a network failure drops it,
//! and neither touches local progress. Dirty records simply wait for the
//! next successful push.

pub mod client;

use chrono::{DateTime, Utc};
use memora_core::sync::{PackageProgress, QuestionProgress};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::db::{
    AccountRepository, DbError, LocalPackage, PackageRepository, ProgressRepository,
    SqliteRepository, SyncStateRepository,
};
use crate::session::SessionSummary;

pub use client::SyncClient;

/// Sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Token rejected by backend: {0}")]
    Unauthorized(String),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not authenticated - please sign in first")]
    NotAuthenticated,

    #[error("Sync already in progress")]
    AlreadyInProgress,

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Sync task failed: {0}")]
    Task(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<DbError> for SyncError {
    fn from(e: DbError) -> Self {
        SyncError::Database(e.to_string())
    }
}

impl SyncError {
    /// Errors after which the cycle is skipped and local state stays authoritative.
    pub fn skips_sync(&self) -> bool {
        matches!(self, SyncError::Unauthorized(_) | SyncError::NotAuthenticated)
    }
}

/// Sync status for the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SyncStatus {
    Idle,
    Syncing { stage: SyncStage },
    Completed { synced_at: DateTime<Utc>, stats: SyncStats },
    Skipped { reason: String },
    Failed { error: String },
}

/// Current sync stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "name")]
pub enum SyncStage {
    Connecting,
    PullingProgress { package_uuid: Option<String> },
    ApplyingChanges,
    PushingProgress { count: usize },
    SavingSession,
}

/// Sync statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub pushed: usize,
    pub pulled: usize,
    pub applied: usize,
    /// Pulled records ignored in favour of unpushed local changes.
    pub kept_local: usize,
    pub sessions_saved: usize,
}

/// How a sync cycle ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncStats),
    Skipped { reason: String },
}

pub type SharedRepository = Arc<Mutex<SqliteRepository>>;

/// Inner state shared across clones.
struct SyncEngineInner {
    client: SyncClient,
    repository: SharedRepository,
    status: Mutex<SyncStatus>,
}

/// Sync engine for progress synchronization.
///
/// This struct is Clone-able because it wraps all state in Arc. The
/// repository lock is only ever taken between awaits.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<SyncEngineInner>,
}

/// Resets the status if a cycle is dropped before it completes (task aborted).
struct RunningGuard<'a> {
    engine: &'a SyncEngine,
    done: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.engine.set_status(SyncStatus::Skipped {
                reason: "cancelled".to_string(),
            });
        }
    }
}

/// A sync cycle running in the background.
pub struct SyncHandle {
    task: JoinHandle<Result<SyncOutcome, SyncError>>,
}

impl SyncHandle {
    fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<SyncOutcome, SyncError>> + Send + 'static,
    {
        Self {
            task: tokio::spawn(future),
        }
    }

    /// Abort the cycle. Local progress is left as it was.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<SyncOutcome, SyncError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(SyncError::Cancelled),
            Err(e) => Err(SyncError::Task(e.to_string())),
        }
    }
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(config: &ClientConfig, repository: SharedRepository) -> Result<Self, SyncError> {
        Ok(Self {
            inner: Arc::new(SyncEngineInner {
                client: SyncClient::new(config)?,
                repository,
                status: Mutex::new(SyncStatus::Idle),
            }),
        })
    }

    /// Get current sync status.
    pub fn status(&self) -> SyncStatus {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn client(&self) -> &SyncClient {
        &self.inner.client
    }

    /// Check if backend is reachable.
    pub async fn check_connectivity(&self) -> Result<bool, SyncError> {
        self.inner.client.check_connectivity().await
    }

    /// Server-side session aggregate for a package, if any session was saved.
    ///
    /// Read-only; the sync status is not touched.
    pub async fn package_progress(&self, package_uuid: &str) -> Result<Option<PackageProgress>, SyncError> {
        let token = self.token()?;
        let response = self.inner.client.get_progress(&token, package_uuid).await?;
        Ok(response.progress.filter(|_| response.found))
    }

    /// Pull the server's copy of one package and reconcile it locally.
    pub async fn pull_package(&self, package_uuid: &str) -> Result<SyncOutcome, SyncError> {
        self.run(|token| self.pull_package_with(token, package_uuid))
            .await
    }

    /// Push the package's dirty records.
    pub async fn push_package(&self, package_uuid: &str) -> Result<SyncOutcome, SyncError> {
        self.run(|token| self.push_package_with(token, package_uuid))
            .await
    }

    /// End-of-session sync: push dirty records, then the session aggregate.
    pub async fn finish_session(
        &self,
        package_uuid: &str,
        summary: &SessionSummary,
    ) -> Result<SyncOutcome, SyncError> {
        let request = summary.to_save_request(package_uuid);
        self.run(|token| async move {
            let mut stats = self.push_package_with(token.clone(), package_uuid).await?;

            self.set_stage(SyncStage::SavingSession);
            let saved = self.inner.client.save_progress(&token, &request).await?;
            tracing::debug!(
                package = package_uuid,
                attempts = saved.progress.attempts,
                best_score = saved.progress.best_score,
                "session aggregate saved"
            );

            stats.sessions_saved = 1;
            Ok(stats)
        })
        .await
    }

    /// Pull every package with recorded progress.
    pub async fn pull_all(&self) -> Result<SyncOutcome, SyncError> {
        self.run(|token| self.pull_all_with(token)).await
    }

    pub fn spawn_pull_package(&self, package_uuid: impl Into<String>) -> SyncHandle {
        let engine = self.clone();
        let package_uuid = package_uuid.into();
        SyncHandle::spawn(async move { engine.pull_package(&package_uuid).await })
    }

    pub fn spawn_push_package(&self, package_uuid: impl Into<String>) -> SyncHandle {
        let engine = self.clone();
        let package_uuid = package_uuid.into();
        SyncHandle::spawn(async move { engine.push_package(&package_uuid).await })
    }

    pub fn spawn_finish_session(&self, package_uuid: impl Into<String>, summary: SessionSummary) -> SyncHandle {
        let engine = self.clone();
        let package_uuid = package_uuid.into();
        SyncHandle::spawn(async move { engine.finish_session(&package_uuid, &summary).await })
    }

    pub fn spawn_pull_all(&self) -> SyncHandle {
        let engine = self.clone();
        SyncHandle::spawn(async move { engine.pull_all().await })
    }

    // === Private methods ===

    async fn run<F, Fut>(&self, operation: F) -> Result<SyncOutcome, SyncError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<SyncStats, SyncError>>,
    {
        self.begin()?;
        let mut guard = RunningGuard {
            engine: self,
            done: false,
        };

        let result = match self.token() {
            Ok(token) => operation(token).await,
            Err(e) => Err(e),
        };

        guard.done = true;
        self.complete(result)
    }

    fn begin(&self) -> Result<(), SyncError> {
        let mut status = self
            .inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if matches!(*status, SyncStatus::Syncing { .. }) {
            return Err(SyncError::AlreadyInProgress);
        }
        *status = SyncStatus::Syncing {
            stage: SyncStage::Connecting,
        };
        Ok(())
    }

    fn complete(&self, result: Result<SyncStats, SyncError>) -> Result<SyncOutcome, SyncError> {
        match result {
            Ok(stats) => {
                tracing::info!(?stats, "sync completed");
                self.set_status(SyncStatus::Completed {
                    synced_at: Utc::now(),
                    stats: stats.clone(),
                });
                Ok(SyncOutcome::Completed(stats))
            }
            Err(e) if e.skips_sync() => {
                let reason = e.to_string();
                tracing::warn!(%reason, "sync skipped, keeping local progress");
                self.set_status(SyncStatus::Skipped {
                    reason: reason.clone(),
                });
                Ok(SyncOutcome::Skipped { reason })
            }
            Err(e) => {
                tracing::warn!(error = %e, "sync failed, will retry next cycle");
                self.set_status(SyncStatus::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn set_status(&self, status: SyncStatus) {
        *self
            .inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn set_stage(&self, stage: SyncStage) {
        self.set_status(SyncStatus::Syncing { stage });
    }

    fn with_repo<T>(
        &self,
        f: impl FnOnce(&SqliteRepository) -> Result<T, DbError>,
    ) -> Result<T, SyncError> {
        let repo = self
            .inner
            .repository
            .lock()
            .map_err(|_| DbError::LockPoisoned)?;
        f(&repo).map_err(Into::into)
    }

    fn token(&self) -> Result<String, SyncError> {
        self.with_repo(|repo| repo.get_account())?
            .map(|account| account.token)
            .ok_or(SyncError::NotAuthenticated)
    }

    async fn pull_package_with(&self, token: String, package_uuid: &str) -> Result<SyncStats, SyncError> {
        self.set_stage(SyncStage::PullingProgress {
            package_uuid: Some(package_uuid.to_string()),
        });
        let response = self
            .inner
            .client
            .pull_question_progress(&token, package_uuid)
            .await?;

        self.set_stage(SyncStage::ApplyingChanges);
        let applied = self.with_repo(|repo| {
            let applied = repo.apply_remote_progress(package_uuid, &response.progress)?;
            if let Some(last_sync) = response.last_sync {
                repo.set_last_sync(package_uuid, last_sync)?;
            }
            Ok(applied)
        })?;

        Ok(SyncStats {
            pulled: response.progress.len(),
            applied: applied.applied,
            kept_local: applied.kept_local,
            ..SyncStats::default()
        })
    }

    async fn push_package_with(&self, token: String, package_uuid: &str) -> Result<SyncStats, SyncError> {
        let dirty = self.with_repo(|repo| repo.dirty_items(package_uuid))?;
        if dirty.is_empty() {
            return Ok(SyncStats::default());
        }

        self.set_stage(SyncStage::PushingProgress { count: dirty.len() });
        let payload: Vec<QuestionProgress> = dirty
            .iter()
            .map(|stored| QuestionProgress::from_item(stored.item_id, &stored.progress))
            .collect();

        let response = self
            .inner
            .client
            .push_question_progress(&token, package_uuid, payload)
            .await?;

        if response.synced_count < dirty.len() {
            // Rejected entries would be rejected again; they are not retried
            tracing::warn!(
                package = package_uuid,
                sent = dirty.len(),
                synced = response.synced_count,
                "backend skipped some progress entries"
            );
        }

        let pushed: Vec<(i64, i64)> = dirty.iter().map(|s| (s.item_id, s.revision)).collect();
        self.with_repo(|repo| repo.mark_items_synced(package_uuid, &pushed))?;

        Ok(SyncStats {
            pushed: response.synced_count,
            ..SyncStats::default()
        })
    }

    async fn pull_all_with(&self, token: String) -> Result<SyncStats, SyncError> {
        self.set_stage(SyncStage::PullingProgress { package_uuid: None });
        let response = self.inner.client.pull_all_question_progress(&token).await?;

        self.set_stage(SyncStage::ApplyingChanges);
        self.with_repo(|repo| {
            let mut stats = SyncStats::default();
            for package in &response.packages {
                repo.upsert_package(&LocalPackage {
                    uuid: package.package_uuid.clone(),
                    name: package.package_name.clone(),
                    questions_count: package.questions_count,
                })?;
                let applied = repo.apply_remote_progress(&package.package_uuid, &package.progress)?;
                stats.pulled += package.progress.len();
                stats.applied += applied.applied;
                stats.kept_local += applied.kept_local;
            }
            Ok(stats)
        })
    }
}
