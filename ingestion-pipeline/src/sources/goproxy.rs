use async_trait::async_trait;
use common::error::AppError;
use reqwest::Client;
use serde::Deserialize;

use super::http::{base_url, build_client, get_optional_json, get_optional_text};

/// Body of a Go module proxy `@v/<version>.info` document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoVersionInfo {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Time")]
    pub time: String,
}

#[async_trait]
pub trait GoProxyApi: Send + Sync {
    /// Raw version strings listed for `module`, as published (`v1.2.3`).
    async fn list_versions(&self, module: &str) -> Result<Vec<String>, AppError>;

    async fn version_info(&self, module: &str, version: &str) -> Result<GoVersionInfo, AppError>;
}

/// Case-encodes a module path or version for the proxy protocol: every
/// uppercase letter becomes `!` followed by its lowercase form.
pub fn escape_module_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for ch in path.chars() {
        if ch.is_ascii_uppercase() {
            escaped.push('!');
            escaped.push(ch.to_ascii_lowercase());
        } else {
            escaped.push(ch);
        }
    }
    escaped
}

/// `v1.2.3+incompatible` -> `1.2.3`.
pub fn clean_version(raw: &str) -> String {
    raw.strip_prefix('v')
        .unwrap_or(raw)
        .replace("+incompatible", "")
}

pub struct GoProxyClient {
    http: Client,
    base: String,
}

impl GoProxyClient {
    pub fn new(base: &str) -> Result<Self, AppError> {
        Ok(Self {
            http: build_client()?,
            base: base_url(base)?,
        })
    }
}

#[async_trait]
impl GoProxyApi for GoProxyClient {
    async fn list_versions(&self, module: &str) -> Result<Vec<String>, AppError> {
        let url = format!("{}/{}/@v/list", self.base, escape_module_path(module));
        let listing = get_optional_text(&self.http, &url).await?.unwrap_or_default();

        Ok(listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn version_info(&self, module: &str, version: &str) -> Result<GoVersionInfo, AppError> {
        let url = format!(
            "{}/{}/@v/{}.info",
            self.base,
            escape_module_path(module),
            escape_module_path(version)
        );
        get_optional_json(&self.http, &url, &[])
            .await?
            .ok_or_else(|| AppError::Fetch(format!("no version info at {url}")))
    }
}
