use std::time::Duration;

use common::utils::config::AppConfig;

#[derive(Debug, Clone)]
pub struct CrawlTuning {
    /// Packages whose facts are fetched at the same time within one pass.
    pub fetch_concurrency: usize,
}

impl Default for CrawlTuning {
    fn default() -> Self {
        Self {
            fetch_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub tuning: CrawlTuning,
    pub record_ttl: Duration,
    pub interval: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            tuning: CrawlTuning::default(),
            record_ttl: Duration::from_secs(3600),
            interval: Duration::from_secs(1800),
        }
    }
}

impl CrawlConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            tuning: CrawlTuning {
                fetch_concurrency: config.crawl_concurrency.max(1),
            },
            record_ttl: Duration::from_secs(config.expiration_secs),
            interval: Duration::from_secs(config.fetch_interval_secs.max(1)),
        }
    }
}
