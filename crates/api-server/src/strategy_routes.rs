//! Strategy persistence: `POST /save_strategy`, `GET /get_all_strategies`,
//! `GET /get_strategy?strategy_id=`. Naming, versioning, and per-user
//! storage are the only responsibilities this surface has — the strategy
//! tree itself is opaque JSON as far as this layer is concerned; only the
//! evaluator (`strategy::evaluator`) interprets it.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Row;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SaveStrategyRequest {
    pub name: String,
    pub user_id: String,
    pub rules: Value,
}

#[derive(Debug, Serialize)]
pub struct SaveStrategyResponse {
    pub success: bool,
    pub strategy_id: i64,
}

#[derive(Debug, Serialize)]
pub struct StrategyRecord {
    pub id: i64,
    pub name: String,
    pub rules: Value,
    pub created_at: String,
    pub updated_at: String,
}

/// `(name, user_id)` is unique; re-saving updates `rules` and bumps
/// `updated_at` rather than erroring.
pub async fn save_strategy(
    State(state): State<AppState>,
    Json(request): Json<SaveStrategyRequest>,
) -> Result<Json<SaveStrategyResponse>, AppError> {
    let rules_json = serde_json::to_string(&request.rules)?;
    let now = Utc::now().to_rfc3339();

    let existing = sqlx::query("SELECT id FROM strategies WHERE name = ? AND user_id = ?")
        .bind(&request.name)
        .bind(&request.user_id)
        .fetch_optional(&state.pool)
        .await?;

    let strategy_id = if let Some(row) = existing {
        let id: i64 = row.try_get("id")?;
        sqlx::query("UPDATE strategies SET rules = ?, updated_at = ? WHERE id = ?")
            .bind(&rules_json)
            .bind(&now)
            .bind(id)
            .execute(&state.pool)
            .await?;
        id
    } else {
        let row = sqlx::query(
            "INSERT INTO strategies (name, rules, user_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&request.name)
        .bind(&rules_json)
        .bind(&request.user_id)
        .bind(&now)
        .bind(&now)
        .fetch_one(&state.pool)
        .await?;
        row.try_get("id")?
    };

    Ok(Json(SaveStrategyResponse { success: true, strategy_id }))
}

/// Newest `updated_at` first.
pub async fn get_all_strategies(State(state): State<AppState>) -> Result<Json<Vec<StrategyRecord>>, AppError> {
    let rows = sqlx::query(
        "SELECT id, name, rules, created_at, updated_at FROM strategies ORDER BY updated_at DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    let records = rows
        .into_iter()
        .map(row_to_record)
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(Json(records))
}

#[derive(Debug, Deserialize)]
pub struct GetStrategyParams {
    pub strategy_id: i64,
}

pub async fn get_strategy(
    State(state): State<AppState>,
    Query(params): Query<GetStrategyParams>,
) -> Result<Json<StrategyRecord>, (StatusCode, String)> {
    let row = sqlx::query("SELECT id, name, rules, created_at, updated_at FROM strategies WHERE id = ?")
        .bind(params.strategy_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    match row {
        Some(row) => {
            let record = row_to_record(row).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:?}")))?;
            Ok(Json(record))
        }
        None => Err((StatusCode::NOT_FOUND, "strategy not found".to_string())),
    }
}

fn row_to_record(row: sqlx::any::AnyRow) -> Result<StrategyRecord, AppError> {
    let rules_str: String = row.try_get("rules")?;
    Ok(StrategyRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        rules: serde_json::from_str(&rules_str)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
