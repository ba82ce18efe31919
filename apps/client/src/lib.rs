//! Study client: local progress store, review sessions and background sync.

pub mod config;
pub mod db;
pub mod decay;
pub mod session;
pub mod state;
pub mod sync;

use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::{ClientConfig, LocalSettings};
pub use db::SqliteRepository;
pub use session::{AnswerOutcome, ItemContent, ReviewSession, SessionSummary};
pub use state::AppState;
pub use sync::{SyncEngine, SyncError, SyncOutcome, SyncStatus};

use db::date_utils::get_adjusted_today;
use db::SettingsRepository;

fn get_db_path() -> PathBuf {
    std::env::var("MEMORA_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("memora-client.db"))
}

/// Open the local store, decay overdue items, then pull everything the
/// server has for the signed-in account.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memora_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_path = get_db_path();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let config = ClientConfig::from_env();
    let state = AppState::open(&db_path, &config).context("failed to open local store")?;

    let settings = state.with_repo(|repo| repo.get_settings())?;
    let today = get_adjusted_today(settings.daily_reset_hour);
    let decayed = state.with_repo(|repo| decay::apply_startup_decay(repo, today, settings.decay_policy))?;
    tracing::info!(db = %db_path.display(), %today, decayed, "local store ready");

    match state.sync.pull_all().await {
        Ok(outcome) => tracing::info!(?outcome, "initial pull finished"),
        Err(e) => tracing::warn!(error = %e, "initial pull failed, continuing offline"),
    }

    Ok(())
}
