//! `AppError`: the HTTP-layer error type. Wraps `anyhow::Error` and maps
//! every fatal error — `backtest_core::BacktestError`, database, JSON —
//! to a `{error, details}` 500 response; this surface has no
//! user-correctable 4xx case beyond a malformed request body, which
//! axum's JSON extractor already rejects before a handler runs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use backtest_core::BacktestError;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    details: String,
}

pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        let body = ErrorBody {
            error: "backtest_failed".to_string(),
            details: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// `BacktestError`'s non-fatal variants (`SymbolUnknown`,
/// `InsufficientHistory`) never reach this conversion: the evaluator and
/// simulator absorb them internally (skip the affected condition, asset,
/// or buy). Anything that does surface here — `WeightSumInvalid`,
/// `UnknownIndicator`, `UnknownComparator`, `UnknownNodeType`,
/// `RepositoryUnavailable` — is fatal by construction.
pub fn backtest_error_to_app_error(err: BacktestError) -> AppError {
    AppError(anyhow::anyhow!(err))
}
