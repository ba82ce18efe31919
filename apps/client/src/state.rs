//! Application state.

use crate::config::ClientConfig;
use crate::db::date_utils::get_adjusted_today;
use crate::db::{DbError, SettingsRepository, SqliteRepository};
use crate::session::{ItemContent, ReviewSession};
use crate::sync::{SharedRepository, SyncEngine, SyncError};
use chrono::Utc;
use rand::Rng;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Global application state.
#[derive(Clone)]
pub struct AppState {
    pub repository: SharedRepository,
    pub sync: SyncEngine,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl AppState {
    pub fn new(repository: SqliteRepository, config: &ClientConfig) -> Result<Self, StateError> {
        let repository = Arc::new(Mutex::new(repository));
        let sync = SyncEngine::new(config, Arc::clone(&repository))?;
        Ok(Self { repository, sync })
    }

    pub fn open<P: AsRef<Path>>(db_path: P, config: &ClientConfig) -> Result<Self, StateError> {
        Self::new(SqliteRepository::open(db_path)?, config)
    }

    /// Run `f` with the repository locked. Never hold the result across an await.
    pub fn with_repo<T>(
        &self,
        f: impl FnOnce(&SqliteRepository) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let repo = self.repository.lock().map_err(|_| DbError::LockPoisoned)?;
        f(&repo)
    }

    /// Start a review session sized by the stored `review_batch_size`, on the
    /// study day given by the stored day-start hour.
    pub fn start_review<R: Rng + ?Sized>(
        &self,
        owner_id: &str,
        contents: Vec<ItemContent>,
        rng: &mut R,
    ) -> Result<ReviewSession, DbError> {
        self.with_repo(|repo| {
            let settings = repo.get_settings()?;
            let today = get_adjusted_today(settings.daily_reset_hour);
            let count = usize::try_from(settings.review_batch_size).unwrap_or(usize::MAX);
            ReviewSession::start(repo, owner_id, contents, count, today, Utc::now(), rng)
        })
    }
}
