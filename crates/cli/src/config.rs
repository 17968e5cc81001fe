use anyhow::{Context, Result};
use dotenvy::dotenv;
use engine::EngineConfig;
use std::env;

/// Process configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub stats_period_days: u32,
    pub retention_days: u32,
}

fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            db_max_connections: var_or("DB_MAX_CONNECTIONS", 10)?,
            stats_period_days: var_or("STATS_PERIOD_DAYS", 30)?,
            retention_days: var_or("RETENTION_DAYS", 30)?,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            default_stats_period_days: self.stats_period_days,
            default_retention_days: self.retention_days,
            ..EngineConfig::default()
        }
    }
}
