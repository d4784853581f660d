use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use common::error::AppError;
use futures::{stream::BoxStream, StreamExt};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::normalize::{RawPackage, RawVersion};

use super::{
    github::{search_repositories, GithubApi, Release},
    map_contributors,
    pypi::{PypiApi, PypiProject},
    RepoDescriptor, SourceAdapter,
};

const SEARCH_QUERY: &str = r#"path:/ filename:pyproject.toml [project.entry-points."endstone"]"#;
const PYPROJECT_PATH: &str = "pyproject.toml";
const PACKAGE_MANAGER: &str = "pip";
const VERSION_FETCH_CONCURRENCY: usize = 4;

static ENDSTONE_REQUIREMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^endstone[^A-Za-z0-9._-]?").ok());

#[derive(Debug, Clone, Deserialize)]
struct Pyproject {
    project: PyprojectProject,
}

#[derive(Debug, Clone, Deserialize)]
struct PyprojectProject {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    keywords: Option<Vec<String>>,
    #[serde(default)]
    dependencies: Option<Vec<String>>,
}

/// Version requirement on `endstone` among PEP 508 dependency strings, or an
/// empty string when the package does not depend on it.
pub fn endstone_requirement<'a>(dependencies: impl IntoIterator<Item = &'a String>) -> String {
    let Some(pattern) = ENDSTONE_REQUIREMENT.as_ref() else {
        return String::new();
    };

    dependencies
        .into_iter()
        .find(|dependency| pattern.is_match(dependency))
        .and_then(|dependency| dependency.strip_prefix("endstone"))
        .map(|requirement| requirement.trim().to_string())
        .unwrap_or_default()
}

/// Python Endstone plugins: repositories whose `pyproject.toml` declares an
/// `endstone` entry point, versioned by GitHub releases and PyPI uploads.
pub struct EndstonePythonAdapter {
    github: Arc<dyn GithubApi>,
    pypi: Arc<dyn PypiApi>,
}

impl EndstonePythonAdapter {
    pub fn new(github: Arc<dyn GithubApi>, pypi: Arc<dyn PypiApi>) -> Self {
        Self { github, pypi }
    }

    async fn pyproject(
        &self,
        repo: &RepoDescriptor,
        git_ref: &str,
    ) -> Result<Option<Pyproject>, AppError> {
        match self.github.raw_file(repo, git_ref, PYPROJECT_PATH).await? {
            Some(raw) => Ok(Some(toml::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn github_version(&self, repo: &RepoDescriptor, release: Release) -> Option<RawVersion> {
        match self.pyproject(repo, &release.tag_name).await {
            Ok(Some(pyproject)) => Some(RawVersion {
                platform_version_requirement: Some(endstone_requirement(
                    pyproject.project.dependencies.iter().flatten(),
                )),
                released_at: release.released_at().to_string(),
                version: release.tag_name,
                source: "github".to_string(),
                package_manager: PACKAGE_MANAGER.to_string(),
            }),
            Ok(None) => {
                debug!(repo = %repo, version = %release.tag_name, "Release has no {PYPROJECT_PATH}");
                None
            }
            Err(err) => {
                warn!(
                    repo = %repo,
                    version = %release.tag_name,
                    error = %err,
                    "Failed to resolve GitHub release; skipping version"
                );
                None
            }
        }
    }

    async fn pypi_version(&self, project: &str, version: String) -> Option<RawVersion> {
        let release = match self.pypi.release(project, &version).await {
            Ok(Some(release)) => release,
            Ok(None) => return None,
            Err(err) => {
                warn!(project, %version, error = %err, "Failed to resolve PyPI release; skipping version");
                return None;
            }
        };

        let released_at = release.urls.first()?.upload_time_iso_8601.clone();
        Some(RawVersion {
            version,
            released_at,
            source: "pypi".to_string(),
            package_manager: PACKAGE_MANAGER.to_string(),
            platform_version_requirement: Some(endstone_requirement(
                release.info.requires_dist.iter().flatten(),
            )),
        })
    }

    async fn pypi_versions(&self, project: &PypiProject) -> Vec<RawVersion> {
        let name = project.info.name.as_str();
        let published: Vec<String> = project.published_versions().map(str::to_string).collect();
        futures::stream::iter(published)
            .map(|version| self.pypi_version(name, version))
            .buffered(VERSION_FETCH_CONCURRENCY)
            .filter_map(futures::future::ready)
            .collect()
            .await
    }
}

#[async_trait]
impl SourceAdapter for EndstonePythonAdapter {
    fn name(&self) -> &'static str {
        "endstone-python"
    }

    fn discover(&self) -> BoxStream<'_, Result<RepoDescriptor, AppError>> {
        search_repositories(self.github.as_ref(), SEARCH_QUERY)
    }

    async fn fetch_facts(&self, repo: &RepoDescriptor) -> Result<Option<RawPackage>, AppError> {
        let (repository, contributors, releases, head) = tokio::try_join!(
            self.github.get_repo(repo),
            self.github.list_contributors(repo),
            self.github.list_releases(repo),
            self.pyproject(repo, "HEAD"),
        )?;

        let Some(head) = head else {
            debug!(repo = %repo, "No {PYPROJECT_PATH} at HEAD");
            return Ok(None);
        };

        let mut versions: Vec<RawVersion> = futures::stream::iter(releases)
            .map(|release| self.github_version(repo, release))
            .buffered(VERSION_FETCH_CONCURRENCY)
            .filter_map(futures::future::ready)
            .collect()
            .await;

        match self.pypi.project(&head.project.name).await {
            Ok(Some(project)) => versions.extend(self.pypi_versions(&project).await),
            Ok(None) => {}
            Err(err) => {
                warn!(
                    repo = %repo,
                    project = %head.project.name,
                    error = %err,
                    "PyPI lookup failed; keeping GitHub versions only"
                );
            }
        }

        if versions.is_empty() {
            debug!(repo = %repo, "No resolvable versions");
            return Ok(None);
        }

        let mut tags = vec!["platform:endstone".to_string(), "type:mod".to_string()];
        tags.extend(head.project.keywords.unwrap_or_default());
        tags.extend(repository.topics.unwrap_or_default());

        Ok(Some(RawPackage {
            identifier: repo.identifier(),
            name: head.project.name,
            description: head.project.description.unwrap_or_default(),
            author: repository.owner.login,
            tags,
            avatar_url: repo.owner_avatar_url(),
            project_url: repo.project_url(),
            hotness: f64::from(repository.stargazers_count),
            contributors: map_contributors(contributors),
            versions,
            source: "github".to_string(),
            package_manager: PACKAGE_MANAGER.to_string(),
        }))
    }
}
