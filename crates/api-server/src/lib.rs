pub mod backtest_routes;
pub mod config;
pub mod db;
pub mod error;
pub mod state;
pub mod strategy_routes;

use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{BoxError, Router};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use config::Config;
use state::AppState;

/// A backtest over a multi-year window can legitimately take tens of
/// seconds; this bounds a runaway request rather than tuning for the
/// common case.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

async fn on_timeout(_: BoxError) -> StatusCode {
    StatusCode::REQUEST_TIMEOUT
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/backtest", post(backtest_routes::run_backtest))
        .route("/save_strategy", post(strategy_routes::save_strategy))
        .route("/get_all_strategies", get(strategy_routes::get_all_strategies))
        .route("/get_strategy", get(strategy_routes::get_strategy))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(on_timeout))
                .timeout(REQUEST_TIMEOUT),
        )
        .with_state(state)
}

/// Initializes structured logging, loads configuration, bootstraps the
/// persisted schema, and serves the HTTP surface until the process is
/// signaled to stop.
pub async fn run_server() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = Config::from_env()?;
    let pool = db::connect(&config.database_url()).await?;
    let state = AppState::new(pool);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
