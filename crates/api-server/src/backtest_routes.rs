//! `POST /backtest`: runs one backtest end to end and returns
//! `{daily_values, spy_values, stats}`.

use axum::extract::State;
use axum::Json;
use backtest_engine::SimulatorConfig;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{backtest_error_to_app_error, AppError};
use crate::state::AppState;
use backtest_engine::BacktestResponse;
use strategy::parser::parse_strategy_node;

#[derive(Debug, Deserialize)]
pub struct BacktestRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub starting_capital: f64,
    pub monthly_investment: f64,
    pub rules: Value,
}

#[axum::debug_handler]
pub async fn run_backtest(
    State(state): State<AppState>,
    Json(request): Json<BacktestRequest>,
) -> Result<Json<BacktestResponse>, AppError> {
    let tree = parse_strategy_node(&request.rules).map_err(backtest_error_to_app_error)?;

    let config = SimulatorConfig {
        start_date: request.start_date,
        end_date: request.end_date,
        starting_capital: request.starting_capital,
        monthly_investment: request.monthly_investment,
    };
    tracing::info!(
        start = %config.start_date,
        end = %config.end_date,
        capital = config.starting_capital,
        "running backtest"
    );

    let today = Utc::now().date_naive();
    let repo: &dyn price_repository::PriceRepository = state.prices.as_ref();

    let response = backtest_engine::run_backtest(&tree, repo, &config, today, None)
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "backtest failed");
            backtest_error_to_app_error(err)
        })?;

    Ok(Json(response))
}
