//! The recursive tree walk: on a given as-of date, evaluates the root node
//! and accumulates buy/sell weights into a [`TransactionDirective`].

use std::future::Future;
use std::pin::Pin;

use backtest_core::{BacktestError, Comparator};
use chrono::NaiveDate;
use indicators::scalar;
use price_repository::PriceRepository;

use crate::tree::{
    Asset, ConditionNode, IndicatorSpec, IndicatorValue, StrategyNode, Threshold,
    TransactionDirective, WeightActionNode, WeightType,
};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Evaluates the root of a strategy tree at `as_of` against `repo`,
/// returning the directive to apply for this rebalance.
pub async fn evaluate(
    root: &StrategyNode,
    repo: &dyn PriceRepository,
    as_of: NaiveDate,
) -> Result<TransactionDirective, BacktestError> {
    let mut directive = TransactionDirective::default();
    evaluate_node(root, repo, as_of, &mut directive).await?;
    Ok(directive)
}

fn evaluate_node<'a>(
    node: &'a StrategyNode,
    repo: &'a dyn PriceRepository,
    as_of: NaiveDate,
    directive: &'a mut TransactionDirective,
) -> BoxFuture<'a, Result<(), BacktestError>> {
    Box::pin(async move {
        match node {
            StrategyNode::Condition(condition) => {
                let matched = evaluate_condition(condition, repo, as_of).await?;
                let branch = if matched { &condition.if_true } else { &condition.if_false };
                for child in branch {
                    evaluate_node(child, repo, as_of, directive).await?;
                }
                Ok(())
            }
            StrategyNode::Weight(action) => execute_weight_action(action, repo, as_of, directive).await,
        }
    })
}

/// Evaluates the indicator at `as_of`. `None` means "not enough data" and
/// propagates as a false condition; composite `and` evaluates each input
/// and returns `None` as soon as any input is `None`.
pub fn evaluate_indicator<'a>(
    spec: &'a IndicatorSpec,
    repo: &'a dyn PriceRepository,
    as_of: NaiveDate,
) -> BoxFuture<'a, Result<Option<IndicatorValue>, BacktestError>> {
    Box::pin(async move {
        if let IndicatorSpec::And { inputs } = spec {
            let mut results = Vec::with_capacity(inputs.len());
            for input in inputs {
                match evaluate_indicator(input, repo, as_of).await? {
                    None => return Ok(None),
                    Some(IndicatorValue::Scalar(v)) => results.push(v),
                    Some(IndicatorValue::List(_)) => {
                        return Err(BacktestError::UnknownNodeType(
                            "'and' inputs may not themselves be composite".to_string(),
                        ))
                    }
                }
            }
            return Ok(Some(IndicatorValue::List(results)));
        }

        let value = evaluate_scalar_indicator(spec, repo, as_of).await?;
        Ok(value.map(IndicatorValue::Scalar))
    })
}

async fn evaluate_scalar_indicator(
    spec: &IndicatorSpec,
    repo: &dyn PriceRepository,
    as_of: NaiveDate,
) -> Result<Option<f64>, BacktestError> {
    match spec {
        IndicatorSpec::CurrentPrice { symbol } => scalar::current_price(repo, symbol, as_of).await,
        IndicatorSpec::SmaPrice { symbol, period } => scalar::sma_price(repo, symbol, as_of, *period).await,
        IndicatorSpec::Ema { symbol, period } => scalar::ema(repo, symbol, as_of, *period).await,
        IndicatorSpec::Rsi { symbol, period } => scalar::rsi(repo, symbol, as_of, *period).await,
        IndicatorSpec::Macd { symbol, fast, slow, .. } => scalar::macd(repo, symbol, as_of, *fast, *slow).await,
        IndicatorSpec::Adx { symbol, period } => scalar::adx(repo, symbol, as_of, *period).await,
        IndicatorSpec::StochasticOscillator { symbol, period } => {
            scalar::stochastic_oscillator(repo, symbol, as_of, *period).await
        }
        IndicatorSpec::StandardDeviationPrice { symbol, period } => {
            scalar::standard_deviation_price(repo, symbol, as_of, *period).await
        }
        IndicatorSpec::SmaReturn { symbol, period } => scalar::sma_return(repo, symbol, as_of, *period).await,
        IndicatorSpec::StandardDeviationReturn { symbol, period } => {
            scalar::standard_deviation_return(repo, symbol, as_of, *period).await
        }
        IndicatorSpec::CumulativeReturn { symbol, period } => {
            scalar::cumulative_return(repo, symbol, as_of, *period).await
        }
        IndicatorSpec::MaxDrawdown { symbol, period } => scalar::max_drawdown(repo, symbol, as_of, *period).await,
        IndicatorSpec::Atr { symbol, period } => scalar::atr(repo, symbol, as_of, *period).await,
        IndicatorSpec::AtrPercent { symbol, period } => scalar::atr_percent(repo, symbol, as_of, *period).await,
        IndicatorSpec::Vix { symbol, period } => scalar::vix(repo, symbol, as_of, *period).await,
        IndicatorSpec::VixChange { symbol, period } => scalar::vix_change(repo, symbol, as_of, *period).await,
        IndicatorSpec::SmaCross { symbol, fast, slow } => scalar::sma_cross(repo, symbol, as_of, *fast, *slow).await,
        IndicatorSpec::And { .. } => unreachable!("composite handled in evaluate_indicator"),
    }
}

async fn evaluate_condition(
    condition: &ConditionNode,
    repo: &dyn PriceRepository,
    as_of: NaiveDate,
) -> Result<bool, BacktestError> {
    let value = match evaluate_indicator(&condition.indicator, repo, as_of).await? {
        None => return Ok(false),
        Some(v) => v,
    };

    compare(&value, condition.comparator, &condition.threshold)
}

fn compare(value: &IndicatorValue, comparator: Comparator, threshold: &Threshold) -> Result<bool, BacktestError> {
    match value {
        IndicatorValue::Scalar(v) => match threshold {
            Threshold::Scalar(t) => Ok(comparator.apply(*v, *t)),
            Threshold::List(_) => Err(BacktestError::UnknownNodeType(
                "scalar indicator compared against a list threshold".to_string(),
            )),
        },
        IndicatorValue::List(values) => {
            let thresholds: Vec<f64> = match threshold {
                Threshold::List(list) => {
                    if list.len() != values.len() {
                        return Err(BacktestError::UnknownNodeType(
                            "mismatched number of values for composite indicator comparison".to_string(),
                        ));
                    }
                    list.clone()
                }
                Threshold::Scalar(t) => std::iter::repeat(*t).take(values.len()).collect(),
            };
            Ok(values
                .iter()
                .zip(thresholds.iter())
                .all(|(v, t)| comparator.apply(*v, *t)))
        }
    }
}

async fn execute_weight_action(
    action: &WeightActionNode,
    repo: &dyn PriceRepository,
    as_of: NaiveDate,
    directive: &mut TransactionDirective,
) -> Result<(), BacktestError> {
    // `weighted_buy` validates the declared weights before filtering by
    // availability, so an unknown symbol fails loudly instead of quietly
    // renormalizing over fewer assets than the author wrote — see
    // DESIGN.md.
    if action.weight_type == WeightType::WeightedBuy {
        let declared_sum: f64 = action.assets.iter().filter_map(|a| a.weight).sum();
        if (declared_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(BacktestError::WeightSumInvalid { sum: declared_sum });
        }
    }

    let mut valid = Vec::with_capacity(action.assets.len());
    for asset in &action.assets {
        if is_valid(asset, repo, as_of).await? {
            valid.push(asset);
        }
    }

    if valid.is_empty() {
        return Ok(());
    }

    match action.weight_type {
        WeightType::EqualBuy => {
            let weight = 1.0 / valid.len() as f64;
            for asset in valid {
                directive.add_buy(&asset.symbol, weight);
            }
        }
        WeightType::WeightedBuy => {
            let total: f64 = valid.iter().filter_map(|a| a.weight).sum();
            for asset in valid {
                let declared = asset.weight.unwrap_or(0.0);
                let normalized = if total > 0.0 { declared / total } else { 0.0 };
                directive.add_buy(&asset.symbol, normalized);
            }
        }
        WeightType::AllSell => {
            for asset in valid {
                directive.add_sell(&asset.symbol, 1.0);
            }
        }
        WeightType::PartialSell => {
            for asset in valid {
                directive.add_sell(&asset.symbol, asset.percentage.unwrap_or(0.0));
            }
        }
    }

    Ok(())
}

async fn is_valid(asset: &Asset, repo: &dyn PriceRepository, as_of: NaiveDate) -> Result<bool, BacktestError> {
    match repo.earliest_date(&asset.symbol).await {
        Ok(Some(earliest)) => Ok(earliest <= as_of),
        Ok(None) => Ok(false),
        Err(e) if e.is_silent() => Ok(false),
        Err(e) => Err(e),
    }
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

    fn repo() -> FixturePriceRepository {
        FixturePriceRepository::new()
            .with_bars("A", vec![bar("A", "2020-01-01", 10.0), bar("A", "2020-06-01", 10.0)])
            .with_bars("B", vec![bar("B", "2020-01-01", 10.0), bar("B", "2020-06-01", 10.0)])
            .with_bars("C", vec![bar("C", "2021-01-01", 10.0)])
    }

    fn weighted_buy(assets: Vec<Asset>) -> WeightActionNode {
        WeightActionNode { weight_type: WeightType::WeightedBuy, assets }
    }

    #[tokio::test]
    async fn weight_normalization_after_filter() {
        let repo = repo();
        let as_of = NaiveDate::parse_from_str("2020-07-01", "%Y-%m-%d").unwrap();
        let action = weighted_buy(vec![
            Asset { symbol: "A".into(), weight: Some(0.5), percentage: None },
            Asset { symbol: "B".into(), weight: Some(0.3), percentage: None },
            Asset { symbol: "C".into(), weight: Some(0.2), percentage: None },
        ]);

        let mut directive = TransactionDirective::default();
        execute_weight_action(&action, &repo, as_of, &mut directive).await.unwrap();

        assert!((directive.buy["A"] - 0.625).abs() < 1e-9);
        assert!((directive.buy["B"] - 0.375).abs() < 1e-9);
        assert!(!directive.buy.contains_key("C"));
    }

    #[tokio::test]
    async fn weight_sum_fault_aborts() {
        let repo = repo();
        let as_of = NaiveDate::parse_from_str("2020-07-01", "%Y-%m-%d").unwrap();
        let action = weighted_buy(vec![
            Asset { symbol: "A".into(), weight: Some(0.5), percentage: None },
            Asset { symbol: "B".into(), weight: Some(0.4), percentage: None },
        ]);

        let mut directive = TransactionDirective::default();
        let err = execute_weight_action(&action, &repo, as_of, &mut directive).await.unwrap_err();
        assert!(matches!(err, BacktestError::WeightSumInvalid { .. }));
    }

    #[tokio::test]
    async fn equal_buy_splits_evenly_across_valid_assets() {
        let repo = repo();
        let as_of = NaiveDate::parse_from_str("2020-07-01", "%Y-%m-%d").unwrap();
        let action = WeightActionNode {
            weight_type: WeightType::EqualBuy,
            assets: vec![
                Asset { symbol: "A".into(), weight: None, percentage: None },
                Asset { symbol: "B".into(), weight: None, percentage: None },
            ],
        };

        let mut directive = TransactionDirective::default();
        execute_weight_action(&action, &repo, as_of, &mut directive).await.unwrap();

        assert_eq!(directive.buy["A"], 0.5);
        assert_eq!(directive.buy["B"], 0.5);
    }

    #[tokio::test]
    async fn composite_and_requires_every_input_true() {
        let repo = FixturePriceRepository::new().with_bars(
            "X",
            (0..250).map(|i| bar("X", &format!("2020-{:02}-{:02}", i / 28 + 1, i % 28 + 1), 50.0)).collect(),
        );
        let as_of = NaiveDate::parse_from_str("2020-09-01", "%Y-%m-%d").unwrap();

        let spec = IndicatorSpec::And {
            inputs: vec![
                IndicatorSpec::SmaPrice { symbol: "X".into(), period: 50 },
                IndicatorSpec::SmaPrice { symbol: "X".into(), period: 200 },
            ],
        };

        let value = evaluate_indicator(&spec, &repo, as_of).await.unwrap();
        assert_eq!(value, Some(IndicatorValue::List(vec![50.0, 50.0])));

        let ok = compare(&value.unwrap(), Comparator::Lt, &Threshold::Scalar(100.0)).unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn missing_data_condition_takes_false_branch() {
        let repo = repo();
        let as_of = NaiveDate::parse_from_str("2020-01-01", "%Y-%m-%d").unwrap();

        let condition = ConditionNode {
            indicator: IndicatorSpec::Rsi { symbol: "A".into(), period: 14 },
            comparator: Comparator::Lt,
            threshold: Threshold::Scalar(30.0),
            if_true: vec![],
            if_false: vec![],
        };

        let matched = evaluate_condition(&condition, &repo, as_of).await.unwrap();
        assert!(!matched);
    }
}
