use std::collections::HashMap;

use backtest_core::Comparator;
use serde::Serialize;

/// A node in the decision tree a strategy is built from. Trees are
/// immutable for the duration of a backtest; the evaluator walks them
/// read-only and never mutates a node.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyNode {
    Condition(ConditionNode),
    Weight(WeightActionNode),
}

#[derive(Debug, Clone, Serialize)]
pub struct ConditionNode {
    pub indicator: IndicatorSpec,
    pub comparator: Comparator,
    pub threshold: Threshold,
    pub if_true: Vec<StrategyNode>,
    pub if_false: Vec<StrategyNode>,
}

/// Either a single threshold or one threshold per composite-indicator
/// input, matched pointwise.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Threshold {
    Scalar(f64),
    List(Vec<f64>),
}

#[derive(Debug, Clone, Serialize)]
pub struct WeightActionNode {
    pub weight_type: WeightType,
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightType {
    EqualBuy,
    WeightedBuy,
    AllSell,
    PartialSell,
}

#[derive(Debug, Clone, Serialize)]
pub struct Asset {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

/// One leaf of an indicator expression: either a named indicator applied
/// to a symbol, or the composite `and` combinator over a list of inputs
/// (whose leaves may reference different symbols).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum IndicatorSpec {
    CurrentPrice {
        symbol: String,
    },
    SmaPrice {
        symbol: String,
        period: usize,
    },
    Ema {
        symbol: String,
        period: usize,
    },
    Rsi {
        symbol: String,
        period: usize,
    },
    Macd {
        symbol: String,
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Adx {
        symbol: String,
        period: usize,
    },
    StochasticOscillator {
        symbol: String,
        period: usize,
    },
    StandardDeviationPrice {
        symbol: String,
        period: usize,
    },
    SmaReturn {
        symbol: String,
        period: usize,
    },
    StandardDeviationReturn {
        symbol: String,
        period: usize,
    },
    CumulativeReturn {
        symbol: String,
        period: usize,
    },
    MaxDrawdown {
        symbol: String,
        period: usize,
    },
    Atr {
        symbol: String,
        period: usize,
    },
    AtrPercent {
        symbol: String,
        period: usize,
    },
    Vix {
        symbol: String,
        period: Option<usize>,
    },
    VixChange {
        symbol: String,
        period: usize,
    },
    SmaCross {
        symbol: String,
        fast: usize,
        slow: usize,
    },
    And {
        inputs: Vec<IndicatorSpec>,
    },
}

/// The result of evaluating an [`IndicatorSpec`]: a plain scalar, or the
/// ordered list a composite `and` produces.
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Scalar(f64),
    List(Vec<f64>),
}

/// The evaluator's output for one rebalance: per-symbol target buy/sell
/// fractions. Discarded after the simulator applies it.
#[derive(Debug, Clone, Default)]
pub struct TransactionDirective {
    pub buy: HashMap<String, f64>,
    pub sell: HashMap<String, f64>,
}

impl TransactionDirective {
    pub fn add_buy(&mut self, symbol: &str, weight: f64) {
        *self.buy.entry(symbol.to_string()).or_insert(0.0) += weight;
    }

    pub fn add_sell(&mut self, symbol: &str, weight: f64) {
        *self.sell.entry(symbol.to_string()).or_insert(0.0) += weight;
    }
}
