use thiserror::Error;

/// Errors surfaced by the price repository, indicator library, strategy
/// evaluator, and simulator.
///
/// `SymbolUnknown` and `InsufficientHistory` are non-fatal: callers treat
/// them as "no data" and skip the affected condition, asset, or allocation.
/// Every other variant is fatal and aborts the backtest.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("symbol not found: {0}")]
    SymbolUnknown(String),

    #[error("insufficient history for {symbol} (need {needed}, have {have})")]
    InsufficientHistory {
        symbol: String,
        needed: usize,
        have: usize,
    },

    #[error("declared weights sum to {sum:.6}, expected 1.0 within 1e-6")]
    WeightSumInvalid { sum: f64 },

    #[error("unknown indicator: {0}")]
    UnknownIndicator(String),

    #[error("unknown comparator: {0}")]
    UnknownComparator(String),

    #[error("unknown strategy node type: {0}")]
    UnknownNodeType(String),

    #[error("price repository unavailable: {0}")]
    RepositoryUnavailable(String),
}

impl BacktestError {
    /// True for errors the evaluator/simulator absorb silently (skip the
    /// affected condition or asset) rather than aborting the backtest.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            BacktestError::SymbolUnknown(_) | BacktestError::InsufficientHistory { .. }
        )
    }
}
