//! Scalar as-of-date indicators: `(symbol, as_of_date, params) -> Option<f64>`.
//!
//! Every function here fetches history through [`PriceRepository::history`],
//! which only ever returns bars with `date <= as_of` — look-ahead safety is
//! therefore structural, not a discipline each function has to uphold
//! separately. If the available history has fewer rows than the indicator
//! needs, the function returns `None`; callers (the evaluator) then treat
//! the enclosing condition as false, per the null-on-insufficient-data
//! contract.

use backtest_core::BacktestError;
use chrono::NaiveDate;
use price_repository::PriceRepository;

use crate::math;

/// Fixed VIX series symbol. `vix` and `vix_change` ignore the `symbol`
/// argument they're given and always read this series instead, since VIX
/// is a single shared market-wide signal rather than a per-asset one.
pub const VIX_SYMBOL: &str = "^VIX";

async fn adj_closes(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
) -> Result<Vec<f64>, BacktestError> {
    let bars = repo.history(symbol, as_of).await?;
    Ok(bars.iter().map(|b| b.adj_close).collect())
}

pub async fn current_price(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
) -> Result<Option<f64>, BacktestError> {
    let bars = repo.history(symbol, as_of).await?;
    Ok(bars.last().map(|b| b.adj_close))
}

pub async fn sma_price(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let closes = adj_closes(repo, symbol, as_of).await?;
    Ok(math::sma_of(&closes, period))
}

pub async fn ema(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let closes = adj_closes(repo, symbol, as_of).await?;
    Ok(math::ema_last(&closes, period))
}

pub async fn rsi(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let closes = adj_closes(repo, symbol, as_of).await?;
    Ok(math::rsi_last(&closes, period))
}

pub async fn macd(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    fast: usize,
    slow: usize,
) -> Result<Option<f64>, BacktestError> {
    let closes = adj_closes(repo, symbol, as_of).await?;
    Ok(math::macd_line_last(&closes, fast, slow))
}

pub async fn adx(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let bars = repo.history(symbol, as_of).await?;
    Ok(math::adx_last(&bars, period))
}

pub async fn stochastic_oscillator(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let bars = repo.history(symbol, as_of).await?;
    Ok(math::stochastic_k_last(&bars, period))
}

pub async fn standard_deviation_price(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let closes = adj_closes(repo, symbol, as_of).await?;
    Ok(math::stdev_of(&closes, period))
}

pub async fn sma_return(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let closes = adj_closes(repo, symbol, as_of).await?;
    let returns = math::simple_returns(&closes);
    Ok(math::sma_of(&returns, period))
}

pub async fn standard_deviation_return(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let closes = adj_closes(repo, symbol, as_of).await?;
    let returns = math::simple_returns(&closes);
    Ok(math::stdev_of(&returns, period))
}

/// `(price_last / price_{last-period}) - 1`.
pub async fn cumulative_return(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let closes = adj_closes(repo, symbol, as_of).await?;
    if period == 0 || closes.len() <= period {
        return Ok(None);
    }
    let last = *closes.last().unwrap();
    let start = closes[closes.len() - 1 - period];
    Ok(Some(last / start - 1.0))
}

/// Minimum over the trailing `period`-bar window of `(price / running_max - 1)`.
pub async fn max_drawdown(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let closes = adj_closes(repo, symbol, as_of).await?;
    if period == 0 || closes.len() < period {
        return Ok(None);
    }
    let window = &closes[closes.len() - period..];
    let mut running_max = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &price in window {
        running_max = running_max.max(price);
        worst = worst.min(price / running_max - 1.0);
    }
    Ok(Some(worst))
}

pub async fn atr(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let bars = repo.history(symbol, as_of).await?;
    Ok(math::atr_last(&bars, period))
}

pub async fn atr_percent(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let bars = repo.history(symbol, as_of).await?;
    let atr_value = match math::atr_last(&bars, period) {
        Some(v) => v,
        None => return Ok(None),
    };
    let price = match bars.last() {
        Some(b) => b.adj_close,
        None => return Ok(None),
    };
    if price == 0.0 {
        return Ok(None);
    }
    Ok(Some(atr_value / price))
}

/// VIX at `as_of`, or its `period`-day mean if `period` is given. The
/// `symbol` argument is accepted for signature uniformity but ignored:
/// this always reads [`VIX_SYMBOL`].
pub async fn vix(
    repo: &dyn PriceRepository,
    _symbol: &str,
    as_of: NaiveDate,
    period: Option<usize>,
) -> Result<Option<f64>, BacktestError> {
    let closes = adj_closes(repo, VIX_SYMBOL, as_of).await?;
    match period {
        None => Ok(closes.last().copied()),
        Some(p) => Ok(math::sma_of(&closes, p)),
    }
}

/// `VIX(as_of) - VIX(as_of - period trading days)`.
pub async fn vix_change(
    repo: &dyn PriceRepository,
    _symbol: &str,
    as_of: NaiveDate,
    period: usize,
) -> Result<Option<f64>, BacktestError> {
    let closes = adj_closes(repo, VIX_SYMBOL, as_of).await?;
    if period == 0 || closes.len() <= period {
        return Ok(None);
    }
    let current = *closes.last().unwrap();
    let past = closes[closes.len() - 1 - period];
    Ok(Some(current - past))
}

/// `sma(fast) / sma(slow)`; > 1 bullish, < 1 bearish.
pub async fn sma_cross(
    repo: &dyn PriceRepository,
    symbol: &str,
    as_of: NaiveDate,
    fast: usize,
    slow: usize,
) -> Result<Option<f64>, BacktestError> {
    let closes = adj_closes(repo, symbol, as_of).await?;
    let fast_sma = match math::sma_of(&closes, fast) {
        Some(v) => v,
        None => return Ok(None),
    };
    let slow_sma = match math::sma_of(&closes, slow) {
        Some(v) => v,
        None => return Ok(None),
    };
    if slow_sma == 0.0 {
        return Ok(None);
    }
    Ok(Some(fast_sma / slow_sma))
}

#[cfg(test)]
mod tests {
    use super::*;
    use backtest_core::PriceBar;
    use price_repository::FixturePriceRepository;

    fn bar(date: &str, price: f64) -> PriceBar {
        PriceBar {
            symbol: "AAA".to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: price,
            high: price,
            low: price,
            close: price,
            adj_close: price,
            volume: 1.0,
        }
    }

    fn repo_with_ramp(n: usize) -> FixturePriceRepository {
        let bars: Vec<PriceBar> = (0..n)
            .map(|i| bar(&format!("2020-01-{:02}", i + 1), 100.0 + i as f64))
            .collect();
        FixturePriceRepository::new().with_bars("AAA", bars)
    }

    #[tokio::test]
    async fn current_price_is_last_bar_at_or_before_as_of() {
        let repo = repo_with_ramp(10);
        let as_of = NaiveDate::parse_from_str("2020-01-05", "%Y-%m-%d").unwrap();
        let price = current_price(&repo, "AAA", as_of).await.unwrap();
        assert_eq!(price, Some(104.0));
    }

    #[tokio::test]
    async fn insufficient_history_returns_none() {
        let repo = repo_with_ramp(5);
        let as_of = NaiveDate::parse_from_str("2020-01-05", "%Y-%m-%d").unwrap();
        let value = sma_price(&repo, "AAA", as_of, 20).await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn look_ahead_safety_ignores_future_bars() {
        let repo = repo_with_ramp(10);
        let as_of = NaiveDate::parse_from_str("2020-01-05", "%Y-%m-%d").unwrap();

        let full = sma_price(&repo, "AAA", as_of, 3).await.unwrap();

        let truncated = FixturePriceRepository::new().with_bars(
            "AAA",
            (0..5)
                .map(|i| bar(&format!("2020-01-{:02}", i + 1), 100.0 + i as f64))
                .collect(),
        );
        let truncated_result = sma_price(&truncated, "AAA", as_of, 3).await.unwrap();

        assert_eq!(full, truncated_result);
    }
}
