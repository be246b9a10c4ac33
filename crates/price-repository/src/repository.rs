use async_trait::async_trait;
use backtest_core::{BacktestError, PanelCell, PriceBar};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Read-only access to OHLCV-by-symbol-and-date and a multi-symbol
/// adjusted-close panel. The only interface the indicator library and the
/// simulator consume; nothing upstream of it (ingestion, refresh scheduling)
/// is part of the core.
///
/// Implementations must be memoizable: identical calls within one backtest
/// must return the same result without re-fetching. Cache keys are
/// `(symbol, as_of)` for [`PriceRepository::history`] and
/// `(sorted symbols, start, end)` for [`PriceRepository::panel`].
#[async_trait]
pub trait PriceRepository: Send + Sync {
    /// All bars for `symbol` with `date <= as_of`, ordered ascending by
    /// date. Fails with [`BacktestError::SymbolUnknown`] if the symbol has
    /// no bars at all; otherwise may return an empty series only if
    /// `as_of` precedes the symbol's first bar.
    async fn history(&self, symbol: &str, as_of: NaiveDate) -> Result<Vec<PriceBar>, BacktestError>;

    /// A date-indexed matrix with one adjusted-close column per requested
    /// symbol, restricted to `start <= date <= end`. Missing (symbol, date)
    /// cells are `None`.
    async fn panel(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, BTreeMap<String, PanelCell>>, BacktestError>;

    /// The minimum date present for the symbol, or `None` if the symbol is
    /// unknown.
    async fn earliest_date(&self, symbol: &str) -> Result<Option<NaiveDate>, BacktestError>;

    /// The market calendar: every date for which an SPY bar exists.
    async fn trading_days(&self) -> Result<Vec<NaiveDate>, BacktestError>;
}
