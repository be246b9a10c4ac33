//! Environment-driven configuration, read once at startup.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub db_host: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_port: u16,
    pub bind_addr: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Loads `.env` (if present) then reads configuration from the
    /// process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            db_host: env_or("DB_HOST", "localhost"),
            db_name: env_or("DB_NAME", "quantedge.db"),
            db_user: env_or("DB_USER", "quantedge"),
            db_password: env_or("DB_PASSWORD", ""),
            db_port: env_or("DB_PORT", "5432")
                .parse()
                .context("DB_PORT must be a valid port number")?,
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
        })
    }

    /// The `sqlx::AnyPool` connection string. Always resolves to a local
    /// SQLite file named after `db_name` — `db_host`/`db_user`/
    /// `db_password`/`db_port` are read and retained so a Postgres target
    /// is a connection-string change away, but are unused by the SQLite
    /// string itself.
    pub fn database_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_name)
    }
}
