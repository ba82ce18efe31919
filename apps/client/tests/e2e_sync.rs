//! End-to-end sync tests against a real backend on an ephemeral port.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use memora_backend::config::ServerConfig;
use memora_backend::AppState as ServerState;
use memora_client::db::{
    AccountRepository, PackageRepository, ProgressRepository, SqliteRepository, SyncStateRepository,
};
use memora_client::sync::SyncStats;
use memora_client::{AppState, ClientConfig, ItemContent, ReviewSession, SyncError, SyncOutcome, SyncStatus};

const PACKAGE: &str = "pkg-biology";

async fn spawn_backend() -> (String, ServerState) {
    let config = ServerConfig {
        database_url: "sqlite::memory:".to_string(),
        ..ServerConfig::default()
    };
    let state = ServerState::initialize(config).await.unwrap();
    state.db.upsert_package(PACKAGE, "Biology", 3).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(memora_backend::serve(listener, state.clone()));

    (format!("http://{addr}"), state)
}

fn device(url: &str, token: Option<&str>) -> AppState {
    let repo = SqliteRepository::open_in_memory().unwrap();
    if let Some(token) = token {
        repo.save_account(token, Some("alice")).unwrap();
    }
    AppState::new(repo, &ClientConfig::new(url)).unwrap()
}

fn contents() -> Vec<ItemContent> {
    [(0, "mitochondria"), (1, "ribosome"), (2, "chlorophyll")]
        .into_iter()
        .map(|(item_id, answer)| ItemContent {
            item_id,
            prompt: format!("Question {item_id}"),
            answer: answer.to_string(),
        })
        .collect()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

/// Answer every selected item correctly and return the finished session.
fn study(state: &AppState) -> ReviewSession {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let started = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let mut session = state
        .with_repo(|repo| ReviewSession::start(repo, PACKAGE, contents(), 3, today(), started, &mut rng))
        .unwrap();

    while let Some(item) = session.current() {
        let answer = item.content.answer.clone();
        state
            .with_repo(|repo| session.answer(repo, &answer, today()))
            .unwrap();
    }
    session
}

#[tokio::test]
async fn test_finish_session_pushes_progress_and_aggregate() {
    let (url, server) = spawn_backend().await;
    let token = server.db.issue_token("alice", Duration::days(1)).await.unwrap().token;
    let client = device(&url, Some(&token));

    let session = study(&client);
    let summary = session.finish(Utc.with_ymd_and_hms(2024, 5, 1, 9, 5, 0).unwrap());
    assert_eq!(summary.score, 3);

    let outcome = client.sync.finish_session(PACKAGE, &summary).await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Completed(SyncStats {
            pushed: 3,
            sessions_saved: 1,
            ..SyncStats::default()
        })
    );
    assert!(matches!(client.sync.status(), SyncStatus::Completed { .. }));
    assert!(client.with_repo(|repo| repo.dirty_items(PACKAGE)).unwrap().is_empty());

    let package = server.db.get_package_by_uuid(PACKAGE).await.unwrap().unwrap();
    let rows = server.db.get_question_progress("alice", package.id).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| row.score == 5));

    let aggregate = server
        .db
        .get_package_progress("alice", package.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(aggregate.attempts, 1);
    assert_eq!(aggregate.best_score, 3);
    assert_eq!(aggregate.total_time_spent, 300);

    let remote = client.sync.package_progress(PACKAGE).await.unwrap().unwrap();
    assert_eq!(remote.attempts, 1);
    assert_eq!(remote.best_score, 3);
}

#[tokio::test]
async fn test_package_progress_before_any_session() {
    let (url, server) = spawn_backend().await;
    let token = server.db.issue_token("alice", Duration::days(1)).await.unwrap().token;
    let client = device(&url, Some(&token));

    assert_eq!(client.sync.package_progress(PACKAGE).await.unwrap(), None);
    assert!(matches!(client.sync.status(), SyncStatus::Idle));
}

#[tokio::test]
async fn test_second_device_pulls_everything() {
    let (url, server) = spawn_backend().await;
    let token = server.db.issue_token("alice", Duration::days(1)).await.unwrap().token;

    let laptop = device(&url, Some(&token));
    study(&laptop);
    laptop.sync.push_package(PACKAGE).await.unwrap();

    let phone = device(&url, Some(&token));
    let outcome = phone.sync.pull_all().await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Completed(SyncStats {
            pulled: 3,
            applied: 3,
            ..SyncStats::default()
        })
    );

    let package = phone.with_repo(|repo| repo.get_package(PACKAGE)).unwrap().unwrap();
    assert_eq!(package.name, "Biology");
    assert_eq!(package.questions_count, 3);

    let ours = laptop.with_repo(|repo| repo.list_item_progress(PACKAGE)).unwrap();
    let theirs = phone.with_repo(|repo| repo.list_item_progress(PACKAGE)).unwrap();
    let strip = |items: Vec<memora_client::db::StoredProgress>| -> Vec<_> {
        items.into_iter().map(|s| (s.item_id, s.progress)).collect()
    };
    assert_eq!(strip(ours), strip(theirs));
}

#[tokio::test]
async fn test_pull_keeps_unpushed_local_changes() {
    let (url, server) = spawn_backend().await;
    let token = server.db.issue_token("alice", Duration::days(1)).await.unwrap().token;

    let laptop = device(&url, Some(&token));
    study(&laptop);
    laptop.sync.push_package(PACKAGE).await.unwrap();

    let phone = device(&url, Some(&token));
    study(&phone);
    let local = phone.with_repo(|repo| repo.get_item_progress(PACKAGE, 0)).unwrap();

    let outcome = phone.sync.pull_package(PACKAGE).await.unwrap();
    let SyncOutcome::Completed(stats) = outcome else {
        panic!("expected a completed pull, got {outcome:?}");
    };
    assert_eq!(stats.pulled, 3);
    assert_eq!(stats.kept_local, 3);
    assert_eq!(phone.with_repo(|repo| repo.get_item_progress(PACKAGE, 0)).unwrap(), local);
    assert!(phone.with_repo(|repo| repo.get_last_sync(PACKAGE)).unwrap().is_some());
}

#[tokio::test]
async fn test_rejected_token_skips_sync_and_keeps_local_state() {
    let (url, _server) = spawn_backend().await;
    let client = device(&url, Some("not-a-real-token"));
    study(&client);

    let outcome = client.sync.push_package(PACKAGE).await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Skipped { .. }));
    assert!(matches!(client.sync.status(), SyncStatus::Skipped { .. }));
    assert_eq!(client.with_repo(|repo| repo.dirty_items(PACKAGE)).unwrap().len(), 3);
}

#[tokio::test]
async fn test_signed_out_device_skips_sync() {
    let (url, _server) = spawn_backend().await;
    let client = device(&url, None);

    let outcome = client.sync.pull_all().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Skipped { .. }));
}

#[tokio::test]
async fn test_unknown_package_fails_without_losing_changes() {
    let (url, server) = spawn_backend().await;
    let token = server.db.issue_token("alice", Duration::days(1)).await.unwrap().token;
    let client = device(&url, Some(&token));

    client
        .with_repo(|repo| {
            let mut progress = repo.add_item("pkg-unknown", 0, today())?;
            progress.score = 40;
            repo.save_item_progress("pkg-unknown", 0, &progress)
        })
        .unwrap();

    let result = client.sync.push_package("pkg-unknown").await;
    assert!(matches!(result, Err(SyncError::PackageNotFound(_))));
    assert!(matches!(client.sync.status(), SyncStatus::Failed { .. }));
    assert_eq!(client.with_repo(|repo| repo.dirty_items("pkg-unknown")).unwrap().len(), 1);
}

#[tokio::test]
async fn test_background_cycle_can_be_joined() {
    let (url, server) = spawn_backend().await;
    let token = server.db.issue_token("alice", Duration::days(1)).await.unwrap().token;
    let client = device(&url, Some(&token));
    study(&client);

    let handle = client.sync.spawn_push_package(PACKAGE);
    let outcome = handle.join().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Completed(SyncStats { pushed: 3, .. })));
}

#[tokio::test]
async fn test_cancelled_cycle_does_not_block_the_next_one() {
    let (url, server) = spawn_backend().await;
    let token = server.db.issue_token("alice", Duration::days(1)).await.unwrap().token;
    let client = device(&url, Some(&token));
    study(&client);

    let handle = client.sync.spawn_push_package(PACKAGE);
    handle.cancel();
    match handle.join().await {
        Err(SyncError::Cancelled) => {}
        Ok(SyncOutcome::Completed(_)) => {}
        other => panic!("unexpected result of a cancelled push: {other:?}"),
    }
    assert!(!matches!(client.sync.status(), SyncStatus::Syncing { .. }));

    let outcome = client.sync.push_package(PACKAGE).await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Completed(_)));
    assert!(client.with_repo(|repo| repo.dirty_items(PACKAGE)).unwrap().is_empty());

    let package = server.db.get_package_by_uuid(PACKAGE).await.unwrap().unwrap();
    let rows = server.db.get_question_progress("alice", package.id).await.unwrap();
    assert_eq!(rows.len(), 3);
}
