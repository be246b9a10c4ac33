pub mod ledger;
pub mod result;
pub mod simulator;
pub mod stats;
pub mod valuation;

pub use ledger::{Ledger, ShareLot, MIN_CASH};
pub use result::{assemble, BacktestResponse};
pub use simulator::{run, SimulationRun, SimulatorConfig};
pub use stats::Stats;

use backtest_core::BacktestError;
use chrono::NaiveDate;
use price_repository::PriceRepository;
use strategy::tree::StrategyNode;
use tokio_util::sync::CancellationToken;

/// End-to-end backtest: drives the simulator, values both ledgers
/// against the post-simulation panel, computes statistics, and
/// assembles the response document.
///
/// This is the single entry point `api-server`'s `/backtest` handler
/// calls; it exists so the HTTP layer does not need to know the internal
/// ledger/valuation/stats handoff.
pub async fn run_backtest(
    tree: &StrategyNode,
    repo: &dyn PriceRepository,
    config: &SimulatorConfig,
    today: NaiveDate,
    cancel: Option<&CancellationToken>,
) -> Result<BacktestResponse, BacktestError> {
    let SimulationRun { portfolio, benchmark } = simulator::run(tree, repo, config, today, cancel).await?;
    tracing::info!(
        days = portfolio.cash_history.len(),
        symbols = portfolio.symbols_ever_held().len(),
        "simulation complete"
    );

    let extra_symbols = valuation::union_symbols(&portfolio, &benchmark);
    let portfolio_values = valuation::value_history(&portfolio, repo, config, &extra_symbols).await?;
    let spy_values = valuation::value_history(&benchmark, repo, config, &extra_symbols).await?;

    let computed = stats::compute(&portfolio_values, &spy_values);
    Ok(result::assemble(&portfolio_values, &portfolio.cash_history, &spy_values, computed))
}
