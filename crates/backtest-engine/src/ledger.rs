//! Portfolio ledger: cash, per-symbol share lots, and the append-only
//! histories the simulator snapshots once per trading day. Its own type
//! rather than inline state on the simulator, so the simulator can drive
//! two independent instances (portfolio and SPY benchmark) through the
//! same buy/sell/snapshot contract.

use std::collections::HashMap;

use chrono::NaiveDate;

/// Reserved against every buy so float error never pushes `cash` negative.
pub const MIN_CASH: f64 = 5.0;

/// A symbol's open position: fractional share count and average cost
/// basis. Present iff `shares > 0`; removed once shares reach zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShareLot {
    pub shares: f64,
    pub avg_price: f64,
}

/// Cash-and-shares ledger for one side of a backtest (the strategy
/// portfolio, or the SPY benchmark). Owned exclusively by the simulator;
/// nothing else mutates it.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub cash: f64,
    pub holdings: HashMap<String, ShareLot>,
    /// Every symbol that has ever held a nonzero position, so valuation
    /// snapshots carry a zero entry for symbols since fully sold rather
    /// than dropping the column.
    held_symbols: Vec<String>,
    pub shares_history: Vec<(NaiveDate, HashMap<String, f64>)>,
    pub cash_history: Vec<(NaiveDate, f64)>,
}

impl Ledger {
    pub fn new(starting_cash: f64) -> Self {
        Self {
            cash: starting_cash,
            holdings: HashMap::new(),
            held_symbols: Vec::new(),
            shares_history: Vec::new(),
            cash_history: Vec::new(),
        }
    }

    /// Cash available to spend on this rebalance, after reserving
    /// [`MIN_CASH`]. Never negative.
    pub fn spendable_cash(&self) -> f64 {
        (self.cash - MIN_CASH).max(0.0)
    }

    /// Buys `shares` of `symbol` at `price`, updating the lot's average
    /// cost (`(old_shares*old_avg + shares*price) / (old_shares+shares)`)
    /// and debiting `cash`. No-op if `shares <= 0` or `price <= 0`.
    pub fn buy(&mut self, symbol: &str, shares: f64, price: f64) {
        if shares <= 0.0 || price <= 0.0 {
            return;
        }
        let cost = shares * price;
        self.cash -= cost;

        let lot = self.holdings.entry(symbol.to_string()).or_insert(ShareLot {
            shares: 0.0,
            avg_price: 0.0,
        });
        let new_shares = lot.shares + shares;
        lot.avg_price = (lot.shares * lot.avg_price + shares * price) / new_shares;
        lot.shares = new_shares;

        if !self.held_symbols.iter().any(|s| s == symbol) {
            self.held_symbols.push(symbol.to_string());
        }
    }

    /// Sells `shares` of `symbol` at `price`, crediting `cash`. Clamped to
    /// the lot's actual share count; removes the lot once it reaches zero.
    /// No-op if the symbol has no open lot.
    pub fn sell(&mut self, symbol: &str, shares: f64, price: f64) {
        let Some(lot) = self.holdings.get_mut(symbol) else {
            return;
        };
        let qty = shares.min(lot.shares).max(0.0);
        if qty <= 0.0 {
            return;
        }
        self.cash += qty * price;
        lot.shares -= qty;
        if lot.shares <= 1e-9 {
            self.holdings.remove(symbol);
        }
    }

    /// Appends one day's `(shares-by-symbol, cash)` entry. `shares` covers
    /// every symbol ever held, including zero for symbols since sold out,
    /// so valuation never has to special-case a dropped column. Dates must
    /// be passed in strictly ascending order; the simulator's date-cursor
    /// loop guarantees this.
    pub fn snapshot(&mut self, date: NaiveDate) {
        let shares: HashMap<String, f64> = self
            .held_symbols
            .iter()
            .map(|s| (s.clone(), self.holdings.get(s).map(|l| l.shares).unwrap_or(0.0)))
            .collect();
        self.shares_history.push((date, shares));
        self.cash_history.push((date, self.cash));
    }

    /// Every symbol that has ever carried a nonzero position.
    pub fn symbols_ever_held(&self) -> &[String] {
        &self.held_symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_updates_weighted_average_cost() {
        let mut ledger = Ledger::new(1000.0);
        ledger.buy("AAA", 2.0, 100.0);
        ledger.buy("AAA", 2.0, 200.0);
        let lot = ledger.holdings["AAA"];
        assert_eq!(lot.shares, 4.0);
        assert!((lot.avg_price - 150.0).abs() < 1e-9);
    }

    #[test]
    fn sell_to_zero_removes_lot() {
        let mut ledger = Ledger::new(0.0);
        ledger.buy("AAA", 3.0, 10.0);
        ledger.sell("AAA", 3.0, 12.0);
        assert!(!ledger.holdings.contains_key("AAA"));
        assert!((ledger.cash - 6.0).abs() < 1e-9);
    }

    #[test]
    fn sell_clamps_to_available_shares() {
        let mut ledger = Ledger::new(0.0);
        ledger.buy("AAA", 1.0, 10.0);
        ledger.sell("AAA", 5.0, 10.0);
        assert!(!ledger.holdings.contains_key("AAA"));
        assert!((ledger.cash - 10.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_carries_zero_for_sold_out_symbol() {
        let mut ledger = Ledger::new(100.0);
        ledger.buy("AAA", 1.0, 10.0);
        let d1 = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        ledger.snapshot(d1);
        ledger.sell("AAA", 1.0, 10.0);
        let d2 = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
        ledger.snapshot(d2);

        assert_eq!(ledger.shares_history[1].1["AAA"], 0.0);
    }
}
