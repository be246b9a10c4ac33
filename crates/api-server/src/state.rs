use std::sync::Arc;

use price_repository::{CachingPriceRepository, SqlPriceRepository};
use sqlx::AnyPool;

/// Shared, process-wide state: the strategy-store pool and the cached
/// price repository every concurrent `/backtest` request reads through.
/// Cheap to clone (axum extracts it per-request via `State`); the
/// expensive parts (`AnyPool`, the LRU cache) are themselves internally
/// `Arc`-backed or behind `Arc` here.
#[derive(Clone)]
pub struct AppState {
    pub pool: AnyPool,
    pub prices: Arc<CachingPriceRepository<SqlPriceRepository>>,
}

impl AppState {
    pub fn new(pool: AnyPool) -> Self {
        let prices = Arc::new(CachingPriceRepository::new(SqlPriceRepository::new(pool.clone())));
        Self { pool, prices }
    }
}
