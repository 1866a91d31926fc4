//! Scrape configuration
//!
//! Feed polling and page fetching settings, read from `SCRAPE_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::tfrrs::TFRRS_BASE_URL;

fn default_feed_url() -> String {
    format!("{}/results.rss", TFRRS_BASE_URL)
}

fn default_user_agent() -> String {
    format!("bactic-scraper/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapeConfig {
    /// RSS feed listing newly posted meets
    pub feed_url: String,
    /// Site root used to build athlete profile URLs
    pub site_base_url: String,
    /// Seconds between feed polls (default: 86400 = daily)
    pub interval_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Meet pages ingested at the same time
    pub max_concurrent_pages: usize,
    /// Also ingest the other result pages a meet page links to
    pub follow_companion_pages: bool,
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            site_base_url: TFRRS_BASE_URL.to_string(),
            interval_secs: 86400,
            fetch_timeout_secs: 30,
            max_concurrent_pages: 4,
            follow_companion_pages: true,
            user_agent: default_user_agent(),
        }
    }
}

impl ScrapeConfig {
    /// Load scrape configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let config = Self {
            feed_url: std::env::var("SCRAPE_FEED_URL").unwrap_or(defaults.feed_url),
            site_base_url: std::env::var("SCRAPE_SITE_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.site_base_url),
            interval_secs: std::env::var("SCRAPE_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.interval_secs),
            fetch_timeout_secs: std::env::var("SCRAPE_FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fetch_timeout_secs),
            max_concurrent_pages: std::env::var("SCRAPE_MAX_CONCURRENT_PAGES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_pages),
            follow_companion_pages: std::env::var("SCRAPE_FOLLOW_COMPANION_PAGES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.follow_companion_pages),
            user_agent: std::env::var("SCRAPE_USER_AGENT").unwrap_or(defaults.user_agent),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.feed_url.is_empty() {
            anyhow::bail!("SCRAPE_FEED_URL cannot be empty");
        }
        if url::Url::parse(&self.site_base_url).is_err() {
            anyhow::bail!("SCRAPE_SITE_BASE_URL is not a valid URL: {}", self.site_base_url);
        }
        if self.interval_secs == 0 {
            anyhow::bail!("SCRAPE_INTERVAL_SECS must be greater than 0");
        }
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("SCRAPE_FETCH_TIMEOUT_SECS must be greater than 0");
        }
        if self.max_concurrent_pages == 0 {
            anyhow::bail!("SCRAPE_MAX_CONCURRENT_PAGES must be greater than 0");
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Profile URL for an athlete link id
    pub fn athlete_url(&self, id: bactic_common::types::SourceId) -> String {
        format!("{}/athletes/{}.html", self.site_base_url, id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use bactic_common::types::SourceId;

    #[test]
    fn test_defaults() {
        let config = ScrapeConfig::default();
        assert_eq!(config.feed_url, "https://www.tfrrs.org/results.rss");
        assert_eq!(config.interval(), Duration::from_secs(86400));
        assert!(config.user_agent.starts_with("bactic-scraper/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = ScrapeConfig {
            max_concurrent_pages: 0,
            ..ScrapeConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SCRAPE_MAX_CONCURRENT_PAGES"));
    }

    #[test]
    fn test_athlete_url() {
        let config = ScrapeConfig {
            site_base_url: "http://127.0.0.1:9000".to_string(),
            ..ScrapeConfig::default()
        };
        assert_eq!(
            config.athlete_url(SourceId(42)),
            "http://127.0.0.1:9000/athletes/42.html"
        );
    }
}
