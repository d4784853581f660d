//! Ecosystem-specific discovery and fact fetching.
//!
//! Every ecosystem is a [`SourceAdapter`]; the crawler holds them in a flat
//! list and treats them uniformly.

pub mod endstone_cpp;
pub mod endstone_python;
pub mod github;
pub mod goproxy;
pub mod http;
pub mod levilamina;
pub mod pypi;

#[cfg(test)]
pub(crate) mod testing;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use common::{
    error::AppError, storage::types::package::Contributor, utils::config::AppConfig,
};
use futures::stream::BoxStream;

use crate::{
    manifest::{DependencyKeys, ManifestMigrator},
    normalize::RawPackage,
};

use self::{
    endstone_cpp::EndstoneCppAdapter,
    endstone_python::EndstonePythonAdapter,
    github::{GithubApi, GithubClient, RepositoryContributor},
    goproxy::GoProxyClient,
    levilamina::LeviLaminaAdapter,
    pypi::PypiClient,
};

/// A repository found by discovery; the unit every adapter fetches facts for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoDescriptor {
    pub owner: String,
    pub repo: String,
}

impl RepoDescriptor {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    pub fn identifier(&self) -> String {
        format!("github:{}/{}", self.owner, self.repo)
    }

    pub fn project_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }

    pub fn owner_avatar_url(&self) -> String {
        format!("https://avatars.githubusercontent.com/{}", self.owner)
    }

    /// Go module path of the repository, as used by the module proxy.
    pub fn module_path(&self) -> String {
        format!("github.com/{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepoDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lazily pages through the ecosystem's discovery predicate. Each call
    /// starts a fresh pass.
    fn discover(&self) -> BoxStream<'_, Result<RepoDescriptor, AppError>>;

    /// Fetches everything known about one repository. `Ok(None)` means the
    /// package has nothing publishable this cycle.
    async fn fetch_facts(&self, repo: &RepoDescriptor) -> Result<Option<RawPackage>, AppError>;
}

pub(crate) fn map_contributors(raw: Vec<RepositoryContributor>) -> Vec<Contributor> {
    raw.into_iter()
        .map(|c| Contributor {
            username: c.login.unwrap_or_default(),
            contributions: c.contributions,
        })
        .collect()
}

/// Builds the production adapter registry from configuration.
pub fn default_adapters(config: &AppConfig) -> Result<Vec<Arc<dyn SourceAdapter>>, AppError> {
    let github: Arc<dyn GithubApi> = Arc::new(GithubClient::new(
        &config.github_api_url,
        &config.github_raw_url,
        &config.github_token,
    )?);
    let goproxy = Arc::new(GoProxyClient::new(&config.goproxy_url)?);
    let pypi = Arc::new(PypiClient::new(&config.pypi_url)?);

    Ok(vec![
        Arc::new(EndstoneCppAdapter::new(Arc::clone(&github))),
        Arc::new(EndstonePythonAdapter::new(Arc::clone(&github), pypi)),
        Arc::new(LeviLaminaAdapter::new(
            github,
            goproxy,
            ManifestMigrator::new(DependencyKeys::levilamina()),
        )),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_derived_urls() {
        let repo = RepoDescriptor::new("Acme", "widget");

        assert_eq!(repo.identifier(), "github:Acme/widget");
        assert_eq!(repo.project_url(), "https://github.com/Acme/widget");
        assert_eq!(repo.owner_avatar_url(), "https://avatars.githubusercontent.com/Acme");
        assert_eq!(repo.module_path(), "github.com/Acme/widget");
        assert_eq!(repo.to_string(), "Acme/widget");
    }

    #[test]
    fn anonymous_contributors_keep_an_empty_username() {
        let mapped = map_contributors(vec![
            RepositoryContributor {
                login: Some("dev".into()),
                contributions: 4,
            },
            RepositoryContributor {
                login: None,
                contributions: 2,
            },
        ]);

        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped.get(1).map(|c| c.username.as_str()), Some(""));
    }
}
