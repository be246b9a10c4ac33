//! Schema bootstrap for the persisted state layout: `symbols`, `prices`,
//! `strategies`. Executes each `CREATE TABLE IF NOT EXISTS` statement
//! against an `sqlx::AnyPool`, so the same pool backs both the price
//! repository and the strategy store.

use anyhow::Result;
use sqlx::any::install_default_drivers;
use sqlx::AnyPool;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS symbols (
    symbol TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS prices (
    symbol TEXT NOT NULL,
    date TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    adj_close REAL NOT NULL,
    volume REAL NOT NULL,
    PRIMARY KEY (symbol, date)
);

CREATE TABLE IF NOT EXISTS strategies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    rules TEXT NOT NULL,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (name, user_id)
);
"#;

pub async fn connect(database_url: &str) -> Result<AnyPool> {
    install_default_drivers();
    let pool = AnyPool::connect(database_url).await?;
    for statement in SCHEMA.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt).execute(&pool).await?;
        }
    }
    Ok(pool)
}
