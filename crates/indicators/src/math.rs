//! Pure, slice-based math underlying each as-of indicator. These never see
//! a repository or a date — the caller in `scalar.rs` has already cut the
//! history to `date <= as_of`, which is what makes look-ahead safety a
//! structural property instead of a per-function discipline.

use backtest_core::PriceBar;

/// Sample mean of the last `period` values, or `None` if there are fewer
/// than `period` values.
pub fn sma_of(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Sample standard deviation (N-1) of the last `period` values.
pub fn stdev_of(values: &[f64], period: usize) -> Option<f64> {
    if period < 2 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
    Some(var.sqrt())
}

/// Daily simple returns `(x_t - x_{t-1}) / x_{t-1}` over the whole series.
pub fn simple_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Exponential moving average seeded by the simple average of the first
/// `period` values, standard `2 / (period + 1)` smoothing. Returns the
/// value at the last element of `values`, or `None` if fewer than `period`
/// values are available.
pub fn ema_last(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    for v in &values[period..] {
        ema = (v - ema) * multiplier + ema;
    }
    Some(ema)
}

/// Wilder RSI at the last element of `values`.
pub fn rsi_last(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }
    let mut gains = Vec::with_capacity(values.len() - 1);
    let mut losses = Vec::with_capacity(values.len() - 1);
    for w in values.windows(2) {
        let change = w[1] - w[0];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
    }

    let rs = if avg_loss == 0.0 { return Some(100.0) } else { avg_gain / avg_loss };
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// MACD line value (fast EMA - slow EMA) at the last element of `values`.
pub fn macd_line_last(values: &[f64], fast: usize, slow: usize) -> Option<f64> {
    if slow < fast || slow == 0 {
        return None;
    }
    let fast_ema = ema_last(values, fast)?;
    let slow_ema = ema_last(values, slow)?;
    Some(fast_ema - slow_ema)
}

/// Wilder ATR at the last bar.
pub fn atr_last(bars: &[PriceBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let true_ranges: Vec<f64> = bars
        .windows(2)
        .map(|w| {
            let (prev, cur) = (&w[0], &w[1]);
            let hl = cur.high - cur.low;
            let hc = (cur.high - prev.close).abs();
            let lc = (cur.low - prev.close).abs();
            hl.max(hc).max(lc)
        })
        .collect();

    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    for tr in &true_ranges[period..] {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
    }
    Some(atr)
}

/// Fast %K stochastic oscillator at the last bar.
pub fn stochastic_k_last(bars: &[PriceBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let last_close = window.last().unwrap().close;

    if highest == lowest {
        return Some(50.0);
    }
    Some(100.0 * (last_close - lowest) / (highest - lowest))
}

/// Wilder ADX at the last bar (needs `2*period + 1` bars: `period` to seed
/// the smoothed DM/TR sums, `period` more to bring the DX smoothing to the
/// last bar).
pub fn adx_last(bars: &[PriceBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period * 2 + 1 {
        return None;
    }

    let mut plus_dm = Vec::with_capacity(bars.len() - 1);
    let mut minus_dm = Vec::with_capacity(bars.len() - 1);
    let mut true_range = Vec::with_capacity(bars.len() - 1);

    for w in bars.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);
        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dm.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });

        let hl = cur.high - cur.low;
        let hc = (cur.high - prev.close).abs();
        let lc = (cur.low - prev.close).abs();
        true_range.push(hl.max(hc).max(lc));
    }

    let mut smoothed_plus_dm = plus_dm[..period].iter().sum::<f64>();
    let mut smoothed_minus_dm = minus_dm[..period].iter().sum::<f64>();
    let mut smoothed_tr = true_range[..period].iter().sum::<f64>();

    let mut dx_values = Vec::new();

    for i in period..plus_dm.len() {
        smoothed_plus_dm = smoothed_plus_dm - smoothed_plus_dm / period as f64 + plus_dm[i];
        smoothed_minus_dm = smoothed_minus_dm - smoothed_minus_dm / period as f64 + minus_dm[i];
        smoothed_tr = smoothed_tr - smoothed_tr / period as f64 + true_range[i];

        let plus_di = 100.0 * smoothed_plus_dm / smoothed_tr;
        let minus_di = 100.0 * smoothed_minus_dm / smoothed_tr;
        let di_sum = plus_di + minus_di;
        let dx = if di_sum == 0.0 { 0.0 } else { 100.0 * (plus_di - minus_di).abs() / di_sum };
        dx_values.push(dx);
    }

    if dx_values.len() < period {
        return None;
    }

    let mut adx = dx_values[..period].iter().sum::<f64>() / period as f64;
    for dx in &dx_values[period..] {
        adx = (adx * (period - 1) as f64 + dx) / period as f64;
    }
    Some(adx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_needs_full_window() {
        assert_eq!(sma_of(&[1.0, 2.0], 3), None);
        assert_eq!(sma_of(&[1.0, 2.0, 3.0], 3), Some(2.0));
    }

    #[test]
    fn stdev_matches_sample_formula() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let got = stdev_of(&values, values.len()).unwrap();
        assert!((got - 2.1380899).abs() < 1e-6);
    }

    #[test]
    fn ema_seeds_with_sma_then_smooths() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let ema3 = ema_last(&values, 3).unwrap();
        // seed = mean(1,2,3) = 2; then smoothed forward over 4, 5
        let multiplier = 2.0 / 4.0;
        let after4 = (4.0 - 2.0) * multiplier + 2.0;
        let after5 = (5.0 - after4) * multiplier + after4;
        assert!((ema3 - after5).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_100_when_no_losses() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(rsi_last(&values, 5), Some(100.0));
    }
}
