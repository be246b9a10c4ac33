pub mod evaluator;
pub mod parser;
pub mod tree;

pub use evaluator::evaluate;
pub use parser::parse_strategy_node;
pub use tree::{StrategyNode, TransactionDirective};
