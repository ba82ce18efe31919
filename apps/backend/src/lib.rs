pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::db::Database;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Open the database named by `config` and bring its schema up to date
    pub async fn initialize(config: ServerConfig) -> anyhow::Result<Self> {
        tracing::info!("Connecting to database...");
        let db = Database::connect(&config.database_url).await?;

        tracing::info!("Running migrations...");
        db.run_migrations().await?;

        Ok(Self {
            db: Arc::new(db),
            config: Arc::new(config),
        })
    }
}

/// Build the full router: public health check plus the token-protected sync API
pub fn build_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/api/sync-question-progress",
            post(routes::progress::sync_question_progress),
        )
        .route(
            "/api/get-question-progress",
            get(routes::progress::get_question_progress),
        )
        .route(
            "/api/get-all-question-progress",
            get(routes::progress::get_all_question_progress),
        )
        .route("/api/save-progress", post(routes::progress::save_progress))
        .route("/api/get-progress", get(routes::progress::get_progress))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            routes::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(state.config.max_body_bytes)),
        )
        .with_state(state)
}

/// Serve the API on an already bound listener until the task is dropped
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = config.bind_address()?;
    let state = AppState::initialize(config).await?;

    tracing::info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    serve(listener, state).await
}

async fn health_check() -> &'static str {
    "OK"
}
