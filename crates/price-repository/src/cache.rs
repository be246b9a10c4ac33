use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use backtest_core::{BacktestError, PanelCell, PriceBar};
use chrono::NaiveDate;
use dashmap::DashMap;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::repository::PriceRepository;

const CACHE_CAPACITY: usize = 128;

type HistoryKey = (String, NaiveDate);
type PanelKey = (Vec<String>, NaiveDate, NaiveDate);
type Panel = BTreeMap<NaiveDate, BTreeMap<String, PanelCell>>;

/// Wraps a [`PriceRepository`] with a bounded LRU cache and per-key fill
/// locks, so concurrent callers requesting the same uncached key block on
/// one upstream fetch rather than issuing redundant queries — a second
/// caller waits on the first caller's fill instead of racing it.
pub struct CachingPriceRepository<R: PriceRepository> {
    inner: R,
    history_cache: Mutex<LruCache<HistoryKey, Vec<PriceBar>>>,
    panel_cache: Mutex<LruCache<PanelKey, Panel>>,
    history_fills: DashMap<HistoryKey, Arc<Mutex<()>>>,
    panel_fills: DashMap<PanelKey, Arc<Mutex<()>>>,
}

impl<R: PriceRepository> CachingPriceRepository<R> {
    pub fn new(inner: R) -> Self {
        let cap = NonZeroUsize::new(CACHE_CAPACITY).expect("capacity is nonzero");
        Self {
            inner,
            history_cache: Mutex::new(LruCache::new(cap)),
            panel_cache: Mutex::new(LruCache::new(cap)),
            history_fills: DashMap::new(),
            panel_fills: DashMap::new(),
        }
    }

    fn fill_lock(fills: &DashMap<HistoryKey, Arc<Mutex<()>>>, key: &HistoryKey) -> Arc<Mutex<()>> {
        fills.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn panel_fill_lock(fills: &DashMap<PanelKey, Arc<Mutex<()>>>, key: &PanelKey) -> Arc<Mutex<()>> {
        fills.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

#[async_trait]
impl<R: PriceRepository> PriceRepository for CachingPriceRepository<R> {
    async fn history(&self, symbol: &str, as_of: NaiveDate) -> Result<Vec<PriceBar>, BacktestError> {
        let key: HistoryKey = (symbol.to_string(), as_of);

        if let Some(hit) = self.history_cache.lock().await.get(&key) {
            return Ok(hit.clone());
        }

        let lock = Self::fill_lock(&self.history_fills, &key);
        let _guard = lock.lock().await;

        if let Some(hit) = self.history_cache.lock().await.get(&key) {
            return Ok(hit.clone());
        }

        let bars = self.inner.history(symbol, as_of).await?;
        self.history_cache.lock().await.put(key.clone(), bars.clone());
        self.history_fills.remove(&key);
        Ok(bars)
    }

    async fn panel(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Panel, BacktestError> {
        let mut sorted_symbols = symbols.to_vec();
        sorted_symbols.sort();
        let key: PanelKey = (sorted_symbols, start, end);

        if let Some(hit) = self.panel_cache.lock().await.get(&key) {
            return Ok(hit.clone());
        }

        let lock = Self::panel_fill_lock(&self.panel_fills, &key);
        let _guard = lock.lock().await;

        if let Some(hit) = self.panel_cache.lock().await.get(&key) {
            return Ok(hit.clone());
        }

        let matrix = self.inner.panel(symbols, start, end).await?;
        self.panel_cache.lock().await.put(key.clone(), matrix.clone());
        self.panel_fills.remove(&key);
        Ok(matrix)
    }

    async fn earliest_date(&self, symbol: &str) -> Result<Option<NaiveDate>, BacktestError> {
        self.inner.earliest_date(symbol).await
    }

    async fn trading_days(&self) -> Result<Vec<NaiveDate>, BacktestError> {
        self.inner.trading_days().await
    }
}
