//! Configuration management
//!
//! Everything is read from the environment (a `.env` file is honoured),
//! then command-line flags override individual values.

use crate::db::DbConfig;
use crate::ingest::ScrapeConfig;

/// Scraper configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DbConfig,
    pub scrape: ScrapeConfig,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DbConfig::from_env(),
            scrape: ScrapeConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.database.validate()?;
        self.scrape.validate()?;
        Ok(())
    }
}
