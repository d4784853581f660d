use std::collections::BTreeMap;

use async_trait::async_trait;
use common::error::AppError;
use reqwest::Client;
use serde::Deserialize;

use super::http::{base_url, build_client, get_optional_json};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PypiFile {
    pub upload_time_iso_8601: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PypiProjectInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PypiProject {
    pub info: PypiProjectInfo,
    #[serde(default)]
    pub releases: BTreeMap<String, Vec<PypiFile>>,
}

impl PypiProject {
    /// Versions that have at least one uploaded distribution.
    pub fn published_versions(&self) -> impl Iterator<Item = &str> {
        self.releases
            .iter()
            .filter(|(_, files)| !files.is_empty())
            .map(|(version, _)| version.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PypiReleaseInfo {
    #[serde(default)]
    pub requires_dist: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PypiRelease {
    pub info: PypiReleaseInfo,
    #[serde(default)]
    pub urls: Vec<PypiFile>,
}

/// PyPI JSON API. Unknown projects and releases are `None`, not errors.
#[async_trait]
pub trait PypiApi: Send + Sync {
    async fn project(&self, name: &str) -> Result<Option<PypiProject>, AppError>;

    async fn release(&self, name: &str, version: &str) -> Result<Option<PypiRelease>, AppError>;
}

pub struct PypiClient {
    http: Client,
    base: String,
}

impl PypiClient {
    pub fn new(base: &str) -> Result<Self, AppError> {
        Ok(Self {
            http: build_client()?,
            base: base_url(base)?,
        })
    }
}

#[async_trait]
impl PypiApi for PypiClient {
    async fn project(&self, name: &str) -> Result<Option<PypiProject>, AppError> {
        let url = format!("{}/pypi/{name}/json", self.base);
        get_optional_json(&self.http, &url, &[]).await
    }

    async fn release(&self, name: &str, version: &str) -> Result<Option<PypiRelease>, AppError> {
        let url = format!("{}/pypi/{name}/{version}/json", self.base);
        get_optional_json(&self.http, &url, &[]).await
    }
}
