use std::collections::BTreeMap;

use async_trait::async_trait;
use backtest_core::{BacktestError, PanelCell, PriceBar};
use chrono::NaiveDate;
use sqlx::{AnyPool, Row};

use crate::repository::PriceRepository;

/// `PriceRepository` backed by the `symbols` / `prices` tables described in
/// the persisted schema. Queries are retried once on a transient failure
/// before surfacing [`BacktestError::RepositoryUnavailable`].
pub struct SqlPriceRepository {
    pool: AnyPool,
}

impl SqlPriceRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    async fn query_history(
        &self,
        symbol: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<PriceBar>, sqlx::Error> {
        sqlx::query(
            "SELECT symbol, date, open, high, low, close, adj_close, volume \
             FROM prices WHERE symbol = ? AND date <= ? ORDER BY date ASC",
        )
        .bind(symbol)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| {
            Ok(PriceBar {
                symbol: row.try_get("symbol")?,
                date: row.try_get("date")?,
                open: row.try_get("open")?,
                high: row.try_get("high")?,
                low: row.try_get("low")?,
                close: row.try_get("close")?,
                adj_close: row.try_get("adj_close")?,
                volume: row.try_get("volume")?,
            })
        })
        .collect()
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, BacktestError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        match op().await {
            Ok(v) => Ok(v),
            Err(first_err) => {
                tracing::warn!(error = %first_err, "price repository query failed, retrying once");
                op().await.map_err(|e| BacktestError::RepositoryUnavailable(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl PriceRepository for SqlPriceRepository {
    async fn history(&self, symbol: &str, as_of: NaiveDate) -> Result<Vec<PriceBar>, BacktestError> {
        let bars = self.with_retry(|| self.query_history(symbol, as_of)).await?;
        if bars.is_empty() && self.earliest_date(symbol).await?.is_none() {
            return Err(BacktestError::SymbolUnknown(symbol.to_string()));
        }
        Ok(bars)
    }

    async fn panel(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, BTreeMap<String, PanelCell>>, BacktestError> {
        let mut matrix: BTreeMap<NaiveDate, BTreeMap<String, PanelCell>> = BTreeMap::new();

        let placeholders = symbols.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let query = format!(
            "SELECT symbol, date, adj_close FROM prices \
             WHERE symbol IN ({placeholders}) AND date BETWEEN ? AND ? ORDER BY date ASC"
        );

        let fetch = || async {
            let mut q = sqlx::query(&query);
            for s in symbols {
                q = q.bind(s);
            }
            q = q.bind(start).bind(end);
            q.fetch_all(&self.pool).await
        };

        let rows = self
            .with_retry(fetch)
            .await?;

        for row in rows {
            let symbol: String = row
                .try_get("symbol")
                .map_err(|e| BacktestError::RepositoryUnavailable(e.to_string()))?;
            let date: NaiveDate = row
                .try_get("date")
                .map_err(|e| BacktestError::RepositoryUnavailable(e.to_string()))?;
            let adj_close: f64 = row
                .try_get("adj_close")
                .map_err(|e| BacktestError::RepositoryUnavailable(e.to_string()))?;
            matrix.entry(date).or_default().insert(symbol, Some(adj_close));
        }

        Ok(matrix)
    }

    async fn earliest_date(&self, symbol: &str) -> Result<Option<NaiveDate>, BacktestError> {
        let row = self
            .with_retry(|| async {
                sqlx::query("SELECT MIN(date) AS earliest FROM prices WHERE symbol = ?")
                    .bind(symbol)
                    .fetch_one(&self.pool)
                    .await
            })
            .await?;

        Ok(row
            .try_get::<Option<NaiveDate>, _>("earliest")
            .map_err(|e| BacktestError::RepositoryUnavailable(e.to_string()))?)
    }

    async fn trading_days(&self) -> Result<Vec<NaiveDate>, BacktestError> {
        let rows = self
            .with_retry(|| async {
                sqlx::query("SELECT date FROM prices WHERE symbol = 'SPY' ORDER BY date ASC")
                    .fetch_all(&self.pool)
                    .await
            })
            .await?;

        rows.into_iter()
            .map(|row| {
                row.try_get("date")
                    .map_err(|e| BacktestError::RepositoryUnavailable(e.to_string()))
            })
            .collect()
    }
}
