use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub http_port: u16,
    #[serde(default)]
    pub github_token: String,
    /// Seconds a package stays visible after its last successful ingestion.
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u64,
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_crawl_concurrency")]
    pub crawl_concurrency: usize,
    #[serde(default = "default_per_page")]
    pub default_per_page: usize,
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
    #[serde(default = "default_github_raw_url")]
    pub github_raw_url: String,
    #[serde(default = "default_pypi_url")]
    pub pypi_url: String,
    #[serde(default = "default_goproxy_url")]
    pub goproxy_url: String,
}

fn default_expiration_secs() -> u64 {
    3600
}

fn default_fetch_interval_secs() -> u64 {
    1800
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_crawl_concurrency() -> usize {
    8
}

fn default_per_page() -> usize {
    20
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_raw_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_pypi_url() -> String {
    "https://pypi.org".to_string()
}

fn default_goproxy_url() -> String {
    "https://goproxy.io".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "package_index".to_string(),
            surrealdb_database: "package_index".to_string(),
            http_port: 3000,
            github_token: String::new(),
            expiration_secs: default_expiration_secs(),
            fetch_interval_secs: default_fetch_interval_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            crawl_concurrency: default_crawl_concurrency(),
            default_per_page: default_per_page(),
            github_api_url: default_github_api_url(),
            github_raw_url: default_github_raw_url(),
            pypi_url: default_pypi_url(),
            goproxy_url: default_goproxy_url(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
