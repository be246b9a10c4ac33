//! Statistics: return and risk metrics computed from two aligned
//! value-history time series. Every metric returns `None` when its
//! denominator is zero or its input has fewer than two observations.

use chrono::NaiveDate;

/// Annual risk-free rate backing `r_daily` in the Sharpe/Sortino formulas.
const ANNUAL_RISK_FREE: f64 = 0.02;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Return and risk metrics, ready to drop into the result assembler's
/// `stats` map.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
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

fn daily_risk_free() -> f64 {
    (1.0 + ANNUAL_RISK_FREE).powf(1.0 / TRADING_DAYS_PER_YEAR) - 1.0
}

fn simple_returns(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect()
}

fn sample_stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

fn total_return(values: &[f64]) -> Option<f64> {
    let (first, last) = (values.first()?, values.last()?);
    if *first == 0.0 {
        return None;
    }
    Some(last / first - 1.0)
}

fn cagr(values: &[f64], dates: &[NaiveDate]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let first = *values.first()?;
    let last = *values.last()?;
    if first <= 0.0 {
        return None;
    }
    let days = (*dates.last()? - *dates.first()?).num_days();
    if days == 0 {
        return None;
    }
    Some((last / first).powf(TRADING_DAYS_PER_YEAR / days as f64) - 1.0)
}

fn max_drawdown(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut running_max = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &v in values {
        running_max = running_max.max(v);
        if running_max > 0.0 {
            worst = worst.min(v / running_max - 1.0);
        }
    }
    Some(worst)
}

fn volatility(returns: &[f64]) -> Option<f64> {
    sample_stdev(returns).map(|sd| sd * TRADING_DAYS_PER_YEAR.sqrt())
}

fn downside_deviation(returns: &[f64], r_daily: f64) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let clipped: Vec<f64> = returns.iter().map(|r| (r - r_daily).min(0.0)).collect();
    sample_stdev(&clipped).map(|sd| sd * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Beta is implemented literally as the correlation of the two return
/// series, not the covariance/variance beta a textbook would use. See
/// `DESIGN.md` for why this is intentional rather than a shortcut.
fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let mean_a = a.iter().sum::<f64>() / a.len() as f64;
    let mean_b = b.iter().sum::<f64>() / b.len() as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

fn ulcer_index(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut running_max = f64::NEG_INFINITY;
    let mut sum_sq = 0.0;
    for &v in values {
        running_max = running_max.max(v);
        if running_max <= 0.0 {
            continue;
        }
        let drawdown_pct = 100.0 * (v / running_max - 1.0);
        sum_sq += drawdown_pct * drawdown_pct;
    }
    Some((sum_sq / values.len() as f64).sqrt())
}

/// Computes every statistic from aligned `(date, portfolio_value)` and
/// `(date, spy_value)` series. Series must share the same date axis;
/// the simulator guarantees this since both ledgers snapshot on the
/// same trading-day cursor.
pub fn compute(portfolio: &[(NaiveDate, f64)], spy: &[(NaiveDate, f64)]) -> Stats {
    let dates: Vec<NaiveDate> = portfolio.iter().map(|(d, _)| *d).collect();
    let values: Vec<f64> = portfolio.iter().map(|(_, v)| *v).collect();
    let spy_values: Vec<f64> = spy.iter().map(|(_, v)| *v).collect();

    let returns = simple_returns(&values);
    let spy_returns = simple_returns(&spy_values);
    let r_daily = daily_risk_free();

    let cagr_value = cagr(&values, &dates);
    let max_dd = max_drawdown(&values);
    let vol = volatility(&returns);
    let downside = downside_deviation(&returns, r_daily);
    let ulcer = ulcer_index(&values);

    let sharpe = match (cagr_value, vol) {
        (Some(c), Some(v)) if v != 0.0 => Some((c - r_daily) / v),
        _ => None,
    };
    let sortino = match (cagr_value, downside) {
        (Some(c), Some(d)) if d != 0.0 => Some((c - r_daily) / d),
        _ => None,
    };
    let calmar = match (cagr_value, max_dd) {
        (Some(c), Some(d)) if d != 0.0 => Some(c / d.abs()),
        _ => None,
    };
    let upi = match (cagr_value, ulcer) {
        (Some(c), Some(u)) if u != 0.0 => Some((c - ANNUAL_RISK_FREE) / u),
        _ => None,
    };

    Stats {
        total_return: total_return(&values),
        cagr: cagr_value,
        max_drawdown: max_dd,
        volatility: vol,
        sharpe,
        sortino,
        calmar,
        beta: correlation(&returns, &spy_returns),
        ulcer_index: ulcer,
        ulcer_performance_index: upi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(start: &str, values: &[f64]) -> Vec<(NaiveDate, f64)> {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + chrono::Days::new(i as u64), *v))
            .collect()
    }

    #[test]
    fn total_return_matches_last_over_first() {
        let values = [100.0, 110.0, 121.0];
        assert!((total_return(&values).unwrap() - 0.21).abs() < 1e-9);
    }

    #[test]
    fn fewer_than_two_points_is_null() {
        let portfolio = series("2020-01-01", &[100.0]);
        let spy = series("2020-01-01", &[100.0]);
        let stats = compute(&portfolio, &spy);
        assert!(stats.cagr.is_none());
        assert!(stats.sharpe.is_none());
        assert!(stats.volatility.is_none());
    }

    #[test]
    fn max_drawdown_is_negative_or_zero() {
        let values = [100.0, 120.0, 90.0, 110.0];
        let dd = max_drawdown(&values).unwrap();
        assert!((dd - (90.0 / 120.0 - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn beta_is_one_for_identical_return_series() {
        let portfolio = series("2020-01-01", &[100.0, 110.0, 121.0, 108.9]);
        let spy = series("2020-01-01", &[50.0, 55.0, 60.5, 54.45]);
        let stats = compute(&portfolio, &spy);
        assert!((stats.beta.unwrap() - 1.0).abs() < 1e-9);
    }
}
