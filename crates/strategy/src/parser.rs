//! Parses a strategy tree from the loosely-typed JSON the HTTP layer
//! receives into the tagged [`StrategyNode`] representation, raising the
//! same fatal error kinds the evaluator itself can raise
//! (`UnknownNodeType`, `UnknownIndicator`, `UnknownComparator`) at parse
//! time rather than relying on serde's derived tag matching to reject an
//! unrecognized tag with a generic deserialization error. This keeps the
//! "dispatch on the tag, fail on the unrecognized case" contract uniform
//! whether the unrecognized tag is caught before or during the tree walk.

use backtest_core::{BacktestError, Comparator};
use serde_json::Value;

use crate::tree::{Asset, ConditionNode, IndicatorSpec, StrategyNode, Threshold, WeightActionNode, WeightType};

fn field<'a>(value: &'a Value, key: &str) -> Result<&'a Value, BacktestError> {
    value
        .get(key)
        .ok_or_else(|| BacktestError::UnknownNodeType(format!("missing field '{key}'")))
}

fn as_str<'a>(value: &'a Value, key: &str) -> Result<&'a str, BacktestError> {
    field(value, key)?
        .as_str()
        .ok_or_else(|| BacktestError::UnknownNodeType(format!("field '{key}' is not a string")))
}

fn as_usize(value: &Value, key: &str) -> Result<usize, BacktestError> {
    field(value, key)?
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| BacktestError::UnknownNodeType(format!("field '{key}' is not a non-negative integer")))
}

fn as_opt_usize(value: &Value, key: &str) -> Result<Option<usize>, BacktestError> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|v| Some(v as usize))
            .ok_or_else(|| BacktestError::UnknownNodeType(format!("field '{key}' is not a non-negative integer"))),
    }
}

pub fn parse_strategy_node(value: &Value) -> Result<StrategyNode, BacktestError> {
    let node_type = as_str(value, "type")?;
    match node_type {
        "condition" => Ok(StrategyNode::Condition(parse_condition(value)?)),
        "weight" => Ok(StrategyNode::Weight(parse_weight_action(value)?)),
        other => Err(BacktestError::UnknownNodeType(other.to_string())),
    }
}

fn parse_condition(value: &Value) -> Result<ConditionNode, BacktestError> {
    let indicator = parse_indicator(field(value, "indicator")?)?;
    let comparator_str = as_str(value, "comparator")?;
    let comparator = Comparator::from_str(comparator_str)
        .ok_or_else(|| BacktestError::UnknownComparator(comparator_str.to_string()))?;
    let threshold = parse_threshold(field(value, "threshold")?)?;
    let if_true = parse_node_list(value.get("if_true"))?;
    let if_false = parse_node_list(value.get("if_false"))?;

    Ok(ConditionNode {
        indicator,
        comparator,
        threshold,
        if_true,
        if_false,
    })
}

fn parse_node_list(value: Option<&Value>) -> Result<Vec<StrategyNode>, BacktestError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(parse_strategy_node).collect(),
        Some(_) => Err(BacktestError::UnknownNodeType("expected an array of child nodes".to_string())),
    }
}

fn parse_threshold(value: &Value) -> Result<Threshold, BacktestError> {
    if let Some(n) = value.as_f64() {
        return Ok(Threshold::Scalar(n));
    }
    if let Some(items) = value.as_array() {
        let parsed: Option<Vec<f64>> = items.iter().map(|v| v.as_f64()).collect();
        return parsed
            .map(Threshold::List)
            .ok_or_else(|| BacktestError::UnknownNodeType("threshold list contains a non-numeric value".to_string()));
    }
    Err(BacktestError::UnknownNodeType("threshold must be a number or list of numbers".to_string()))
}

fn parse_weight_action(value: &Value) -> Result<WeightActionNode, BacktestError> {
    let weight_type_str = as_str(value, "weight_type")?;
    let weight_type = match weight_type_str {
        "equal_buy" => WeightType::EqualBuy,
        "weighted_buy" => WeightType::WeightedBuy,
        "all_sell" => WeightType::AllSell,
        "partial_sell" => WeightType::PartialSell,
        other => return Err(BacktestError::UnknownNodeType(format!("unknown weight_type: {other}"))),
    };

    let assets_value = field(value, "assets")?;
    let assets_array = assets_value
        .as_array()
        .ok_or_else(|| BacktestError::UnknownNodeType("assets must be an array".to_string()))?;

    let assets = assets_array
        .iter()
        .map(|a| {
            Ok(Asset {
                symbol: as_str(a, "symbol")?.to_string(),
                weight: a.get("weight").and_then(Value::as_f64),
                percentage: a.get("percentage").and_then(Value::as_f64),
            })
        })
        .collect::<Result<Vec<_>, BacktestError>>()?;

    Ok(WeightActionNode { weight_type, assets })
}

fn parse_indicator(value: &Value) -> Result<IndicatorSpec, BacktestError> {
    let name = as_str(value, "name")?;

    if name == "and" {
        let inputs_value = field(value, "inputs")?;
        let inputs_array = inputs_value
            .as_array()
            .ok_or_else(|| BacktestError::UnknownNodeType("'and' inputs must be an array".to_string()))?;
        let inputs = inputs_array.iter().map(parse_indicator).collect::<Result<Vec<_>, _>>()?;
        return Ok(IndicatorSpec::And { inputs });
    }

    let symbol = as_str(value, "symbol")?.to_string();

    Ok(match name {
        "current_price" => IndicatorSpec::CurrentPrice { symbol },
        "sma_price" => IndicatorSpec::SmaPrice { symbol, period: as_usize(value, "period")? },
        "ema" => IndicatorSpec::Ema { symbol, period: as_usize(value, "period")? },
        "rsi" => IndicatorSpec::Rsi { symbol, period: as_usize(value, "period")? },
        "macd" => IndicatorSpec::Macd {
            symbol,
            fast: as_usize(value, "fast")?,
            slow: as_usize(value, "slow")?,
            signal: as_usize(value, "signal")?,
        },
        "adx" => IndicatorSpec::Adx { symbol, period: as_usize(value, "period")? },
        "stochastic_oscillator" => IndicatorSpec::StochasticOscillator { symbol, period: as_usize(value, "period")? },
        "standard_deviation_price" => IndicatorSpec::StandardDeviationPrice { symbol, period: as_usize(value, "period")? },
        "sma_return" => IndicatorSpec::SmaReturn { symbol, period: as_usize(value, "period")? },
        "standard_deviation_return" => IndicatorSpec::StandardDeviationReturn { symbol, period: as_usize(value, "period")? },
        "cumulative_return" => IndicatorSpec::CumulativeReturn { symbol, period: as_usize(value, "period")? },
        "max_drawdown" => IndicatorSpec::MaxDrawdown { symbol, period: as_usize(value, "period")? },
        "atr" => IndicatorSpec::Atr { symbol, period: as_usize(value, "period")? },
        "atr_percent" => IndicatorSpec::AtrPercent { symbol, period: as_usize(value, "period")? },
        "vix" => IndicatorSpec::Vix { symbol, period: as_opt_usize(value, "period")? },
        "vix_change" => IndicatorSpec::VixChange { symbol, period: as_usize(value, "period")? },
        "sma_cross" => IndicatorSpec::SmaCross {
            symbol,
            fast: as_usize(value, "fast")?,
            slow: as_usize(value, "slow")?,
        },
        other => return Err(BacktestError::UnknownIndicator(other.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_equal_buy_weight_action() {
        let node = json!({
            "type": "weight",
            "weight_type": "equal_buy",
            "assets": [{"symbol": "SPY"}, {"symbol": "QQQ"}]
        });

        let parsed = parse_strategy_node(&node).unwrap();
        match parsed {
            StrategyNode::Weight(w) => {
                assert_eq!(w.weight_type, WeightType::EqualBuy);
                assert_eq!(w.assets.len(), 2);
            }
            _ => panic!("expected a weight node"),
        }
    }

    #[test]
    fn rejects_unknown_indicator_name() {
        let node = json!({
            "type": "condition",
            "indicator": {"name": "made_up_indicator", "symbol": "SPY", "period": 10},
            "comparator": "<",
            "threshold": 100,
            "if_true": [],
            "if_false": []
        });

        let err = parse_strategy_node(&node).unwrap_err();
        assert!(matches!(err, BacktestError::UnknownIndicator(_)));
    }

    #[test]
    fn rejects_unknown_comparator() {
        let node = json!({
            "type": "condition",
            "indicator": {"name": "current_price", "symbol": "SPY"},
            "comparator": "~=",
            "threshold": 100,
            "if_true": [],
            "if_false": []
        });

        let err = parse_strategy_node(&node).unwrap_err();
        assert!(matches!(err, BacktestError::UnknownComparator(_)));
    }

    #[test]
    fn parses_composite_and_indicator() {
        let node = json!({
            "type": "condition",
            "indicator": {
                "name": "and",
                "inputs": [
                    {"name": "sma_price", "symbol": "AAPL", "period": 50},
                    {"name": "sma_price", "symbol": "AAPL", "period": 200}
                ]
            },
            "comparator": "<",
            "threshold": 100,
            "if_true": [],
            "if_false": []
        });

        let parsed = parse_strategy_node(&node).unwrap();
        match parsed {
            StrategyNode::Condition(c) => match c.indicator {
                IndicatorSpec::And { inputs } => assert_eq!(inputs.len(), 2),
                _ => panic!("expected composite indicator"),
            },
            _ => panic!("expected a condition node"),
        }
    }
}
