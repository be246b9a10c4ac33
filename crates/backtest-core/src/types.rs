use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single OHLCV price bar for one symbol on one calendar date.
///
/// `adj_close` is the canonical price consumed by every indicator and by
/// the simulator; `close` is retained only for provider fidelity and is
/// never read by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: f64,
}

/// One cell of a multi-symbol adjusted-close panel: `None` means no bar
/// was recorded for that (symbol, date) before last-observation-carry-forward
/// is applied downstream.
pub type PanelCell = Option<f64>;

/// Comparator used by a Condition node, applied either directly to a
/// scalar indicator result or pointwise across a composite `and` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparator {
    /// Apply the comparator to a single (value, threshold) pair.
    pub fn apply(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Gt => value > threshold,
            Comparator::Lt => value < threshold,
            Comparator::Ge => value >= threshold,
            Comparator::Le => value <= threshold,
            Comparator::Eq => value == threshold,
            Comparator::Ne => value != threshold,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            ">" => Some(Comparator::Gt),
            "<" => Some(Comparator::Lt),
            ">=" => Some(Comparator::Ge),
            "<=" => Some(Comparator::Le),
            "==" => Some(Comparator::Eq),
            "!=" => Some(Comparator::Ne),
            _ => None,
        }
    }
}
