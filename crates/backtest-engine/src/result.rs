//! Result assembler: normalizes floating-point edge values and assembles
//! the `{daily_values, spy_values, stats}` document the `POST /backtest`
//! response body returns. NaN and ±Infinity become `null` once, at
//! construction, via [`clean`], rather than leaking through to the JSON
//! encoder.

use chrono::NaiveDate;
use serde::Serialize;

use crate::stats::Stats;

/// NaN and ±Infinity serialize as JSON `null`; finite values pass through.
fn clean(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyValue {
    pub date: String,
    pub portfolio_value: Option<f64>,
    pub cash: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpyValue {
    pub date: String,
    pub spy_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsDocument {
    pub total_return: Option<f64>,
    pub cagr: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub volatility: Option<f64>,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub calmar: Option<f64>,
    pub beta: Option<f64>,
    pub ulcer_index: Option<f64>,
    pub ulcer_performance_index: Option<f64>,
}

impl From<Stats> for StatsDocument {
    fn from(s: Stats) -> Self {
        Self {
            total_return: s.total_return.and_then(clean),
            cagr: s.cagr.and_then(clean),
            max_drawdown: s.max_drawdown.and_then(clean),
            volatility: s.volatility.and_then(clean),
            sharpe: s.sharpe.and_then(clean),
            sortino: s.sortino.and_then(clean),
            calmar: s.calmar.and_then(clean),
            beta: s.beta.and_then(clean),
            ulcer_index: s.ulcer_index.and_then(clean),
            ulcer_performance_index: s.ulcer_performance_index.and_then(clean),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestResponse {
    pub daily_values: Vec<DailyValue>,
    pub spy_values: Vec<SpyValue>,
    pub stats: StatsDocument,
}

/// Builds the final response from the portfolio and SPY value/cash
/// histories plus the computed [`Stats`]. Dates render as `YYYY-MM-DD`.
pub fn assemble(
    portfolio_values: &[(NaiveDate, f64)],
    portfolio_cash: &[(NaiveDate, f64)],
    spy_values: &[(NaiveDate, f64)],
    stats: Stats,
) -> BacktestResponse {
    let daily_values = portfolio_values
        .iter()
        .zip(portfolio_cash.iter())
        .map(|((date, value), (_, cash))| DailyValue {
            date: date.format("%Y-%m-%d").to_string(),
            portfolio_value: clean(*value),
            cash: clean(*cash),
        })
        .collect();

    let spy_values = spy_values
        .iter()
        .map(|(date, value)| SpyValue {
            date: date.format("%Y-%m-%d").to_string(),
            spy_value: clean(*value),
        })
        .collect();

    BacktestResponse {
        daily_values,
        spy_values,
        stats: stats.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_and_infinite_become_null() {
        assert_eq!(clean(f64::NAN), None);
        assert_eq!(clean(f64::INFINITY), None);
        assert_eq!(clean(f64::NEG_INFINITY), None);
        assert_eq!(clean(1.5), Some(1.5));
    }

    #[test]
    fn dates_render_as_yyyy_mm_dd() {
        let d = NaiveDate::from_ymd_opt(2021, 3, 9).unwrap();
        let values = vec![(d, 100.0)];
        let cash = vec![(d, 5.0)];
        let spy = vec![(d, 200.0)];
        let response = assemble(&values, &cash, &spy, Stats::default());
        assert_eq!(response.daily_values[0].date, "2021-03-09");
        assert_eq!(response.spy_values[0].date, "2021-03-09");
    }
}
