//! Post-simulation valuation: loads the adjusted-close panel for every
//! symbol the backtest ever touched plus SPY, and turns each day's
//! `(cash, shares-by-symbol)` snapshot into a single portfolio value.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use price_repository::PriceRepository;

use backtest_core::BacktestError;

use crate::ledger::Ledger;
use crate::simulator::SimulatorConfig;

const SPY: &str = "SPY";

/// `value_history[d] = cash_history[d] + sum(shares_history[d][s] * panel[d, s])`,
/// in ascending-date order matching `ledger.shares_history`.
pub async fn value_history(
    ledger: &Ledger,
    repo: &dyn PriceRepository,
    config: &SimulatorConfig,
    extra_symbols: &[String],
) -> Result<Vec<(NaiveDate, f64)>, BacktestError> {
    if ledger.shares_history.is_empty() {
        return Ok(Vec::new());
    }

    let mut symbols: Vec<String> = ledger.symbols_ever_held().to_vec();
    symbols.extend(extra_symbols.iter().cloned());
    symbols.sort();
    symbols.dedup();

    if symbols.is_empty() {
        return Ok(ledger.cash_history.clone());
    }

    let panel = repo.panel(&symbols, config.start_date, config.end_date).await?;
    let filled = forward_fill(panel, &symbols);

    let mut out = Vec::with_capacity(ledger.shares_history.len());
    for ((date, shares), (_, cash)) in ledger.shares_history.iter().zip(ledger.cash_history.iter()) {
        let prices = filled.get(date);
        let mut value = *cash;
        for (symbol, qty) in shares {
            if *qty == 0.0 {
                continue;
            }
            if let Some(price) = prices.and_then(|row| row.get(symbol)).copied().flatten() {
                value += qty * price;
            }
        }
        out.push((*date, value));
    }
    Ok(out)
}

/// Last-observation-carried-forward over the panel's date axis, applied
/// independently per symbol column.
fn forward_fill(
    panel: BTreeMap<NaiveDate, BTreeMap<String, Option<f64>>>,
    symbols: &[String],
) -> BTreeMap<NaiveDate, BTreeMap<String, Option<f64>>> {
    let mut last: BTreeMap<&str, f64> = BTreeMap::new();
    let symbol_set: HashSet<&str> = symbols.iter().map(|s| s.as_str()).collect();
    let mut filled = BTreeMap::new();

    for (date, row) in panel {
        let mut out_row: BTreeMap<String, Option<f64>> = BTreeMap::new();
        for symbol in &symbol_set {
            let cell = row.get(*symbol).copied().flatten();
            let resolved = match cell {
                Some(price) => {
                    last.insert(symbol, price);
                    Some(price)
                }
                None => last.get(symbol).copied(),
            };
            out_row.insert((*symbol).to_string(), resolved);
        }
        filled.insert(date, out_row);
    }
    filled
}

/// `sorted(union of all symbols held at any point) ∪ {SPY}`, as required
/// to load one panel that covers both ledgers.
pub fn union_symbols(portfolio: &Ledger, benchmark: &Ledger) -> Vec<String> {
    let mut symbols: HashSet<String> = portfolio.symbols_ever_held().iter().cloned().collect();
    symbols.extend(benchmark.symbols_ever_held().iter().cloned());
    symbols.insert(SPY.to_string());
    let mut out: Vec<String> = symbols.into_iter().collect();
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use backtest_core::PriceBar;
    use price_repository::FixturePriceRepository;

    fn bar(symbol: &str, date: &str, price: f64) -> PriceBar {
        PriceBar {
            symbol: symbol.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: price,
            high: price,
            low: price,
            close: price,
            adj_close: price,
            volume: 1.0,
        }
    }

    #[tokio::test]
    async fn value_history_carries_last_price_forward_over_gaps() {
        let repo = FixturePriceRepository::new().with_bars(
            "AAA",
            vec![bar("AAA", "2020-01-02", 10.0), bar("AAA", "2020-01-06", 12.0)],
        );
        let mut ledger = Ledger::new(0.0);
        ledger.buy("AAA", 2.0, 10.0);
        let d1 = NaiveDate::parse_from_str("2020-01-02", "%Y-%m-%d").unwrap();
        let d2 = NaiveDate::parse_from_str("2020-01-03", "%Y-%m-%d").unwrap();
        ledger.snapshot(d1);
        ledger.snapshot(d2);

        let config = SimulatorConfig {
            start_date: d1,
            end_date: d2,
            starting_capital: 0.0,
            monthly_investment: 0.0,
        };
        let values = value_history(&ledger, &repo, &config, &[]).await.unwrap();
        assert_eq!(values[0].1, 20.0);
        // 2020-01-03 has no AAA bar; LOCF keeps the 2020-01-02 price of 10.0.
        assert_eq!(values[1].1, 20.0);
    }
}
