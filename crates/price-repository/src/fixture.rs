use std::collections::BTreeMap;

use async_trait::async_trait;
use backtest_core::{BacktestError, PanelCell, PriceBar};
use chrono::NaiveDate;

use crate::repository::PriceRepository;

/// Plain in-memory [`PriceRepository`] for exercising the indicator
/// library, the evaluator, and the simulator without a database. Not
/// memoized — callers that need the caching contract wrap it in
/// [`crate::CachingPriceRepository`].
#[derive(Default, Clone)]
pub struct FixturePriceRepository {
    bars: BTreeMap<String, Vec<PriceBar>>,
}

impl FixturePriceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert bars for a symbol; kept sorted ascending by date.
    pub fn with_bars(mut self, symbol: &str, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        self.bars.insert(symbol.to_string(), bars);
        self
    }
}

#[async_trait]
impl PriceRepository for FixturePriceRepository {
    async fn history(&self, symbol: &str, as_of: NaiveDate) -> Result<Vec<PriceBar>, BacktestError> {
        match self.bars.get(symbol) {
            Some(bars) => Ok(bars.iter().filter(|b| b.date <= as_of).cloned().collect()),
            None => Err(BacktestError::SymbolUnknown(symbol.to_string())),
        }
    }

    async fn panel(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, BTreeMap<String, PanelCell>>, BacktestError> {
        let mut matrix: BTreeMap<NaiveDate, BTreeMap<String, PanelCell>> = BTreeMap::new();
        for symbol in symbols {
            if let Some(bars) = self.bars.get(symbol) {
                for bar in bars.iter().filter(|b| b.date >= start && b.date <= end) {
                    matrix
                        .entry(bar.date)
                        .or_default()
                        .insert(symbol.clone(), Some(bar.adj_close));
                }
            }
        }
        Ok(matrix)
    }

    async fn earliest_date(&self, symbol: &str) -> Result<Option<NaiveDate>, BacktestError> {
        Ok(self.bars.get(symbol).and_then(|bars| bars.first()).map(|b| b.date))
    }

    async fn trading_days(&self) -> Result<Vec<NaiveDate>, BacktestError> {
        Ok(self
            .bars
            .get("SPY")
            .map(|bars| bars.iter().map(|b| b.date).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(symbol: &str, date: &str, price: f64) -> PriceBar {
        PriceBar {
            symbol: symbol.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: price,
            high: price,
            low: price,
            close: price,
            adj_close: price,
            volume: 1_000_000.0,
        }
    }

    #[tokio::test]
    async fn history_filters_future_bars() {
        let repo = FixturePriceRepository::new().with_bars(
            "SPY",
            vec![
                bar("SPY", "2020-01-02", 100.0),
                bar("SPY", "2020-01-03", 101.0),
                bar("SPY", "2020-01-06", 102.0),
            ],
        );

        let as_of = NaiveDate::parse_from_str("2020-01-03", "%Y-%m-%d").unwrap();
        let history = repo.history("SPY", as_of).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().adj_close, 101.0);
    }

    #[tokio::test]
    async fn unknown_symbol_is_an_error() {
        let repo = FixturePriceRepository::new();
        let as_of = NaiveDate::parse_from_str("2020-01-03", "%Y-%m-%d").unwrap();
        let result = repo.history("ZZZZ", as_of).await;
        assert!(matches!(result, Err(BacktestError::SymbolUnknown(_))));
    }
}
