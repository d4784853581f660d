use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use common::error::AppError;
use futures::{stream::BoxStream, StreamExt};
use regex::Regex;
use tracing::{debug, warn};

use crate::normalize::{RawPackage, RawVersion};

use super::{
    github::{search_repositories, GithubApi, Release},
    map_contributors, RepoDescriptor, SourceAdapter,
};

const SEARCH_QUERY: &str = "path:/ filename:CMakeLists.txt endstone_add_plugin";
const BUILD_FILE: &str = "CMakeLists.txt";
const RELEASE_FETCH_CONCURRENCY: usize = 4;

static ENDSTONE_FETCH_CONTENT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"FetchContent_Declare\(\s+endstone\s+GIT_REPOSITORY\s+https://github\.com/EndstoneMC/endstone\.git\s+GIT_TAG\s+(\S+)\s+\)",
    )
    .ok()
});

/// The endstone tag a `CMakeLists.txt` pins through `FetchContent_Declare`,
/// or an empty string when it does not pin one.
pub fn pinned_endstone_tag(cmake_lists: &str) -> String {
    ENDSTONE_FETCH_CONTENT
        .as_ref()
        .and_then(|pattern| pattern.captures(cmake_lists))
        .and_then(|captures| captures.get(1))
        .map(|tag| tag.as_str().to_string())
        .unwrap_or_default()
}

/// Native Endstone plugins built with `endstone_add_plugin`.
pub struct EndstoneCppAdapter {
    github: Arc<dyn GithubApi>,
}

impl EndstoneCppAdapter {
    pub fn new(github: Arc<dyn GithubApi>) -> Self {
        Self { github }
    }

    async fn resolve_release(&self, repo: &RepoDescriptor, release: Release) -> Option<RawVersion> {
        match self.github.raw_file(repo, &release.tag_name, BUILD_FILE).await {
            Ok(Some(cmake_lists)) => Some(RawVersion {
                platform_version_requirement: Some(pinned_endstone_tag(&cmake_lists)),
                released_at: release.released_at().to_string(),
                version: release.tag_name,
                source: "github".to_string(),
                package_manager: String::new(),
            }),
            Ok(None) => {
                debug!(repo = %repo, version = %release.tag_name, "Release has no {BUILD_FILE}");
                None
            }
            Err(err) => {
                warn!(
                    repo = %repo,
                    version = %release.tag_name,
                    error = %err,
                    "Failed to resolve release; skipping version"
                );
                None
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for EndstoneCppAdapter {
    fn name(&self) -> &'static str {
        "endstone-cpp"
    }

    fn discover(&self) -> BoxStream<'_, Result<RepoDescriptor, AppError>> {
        search_repositories(self.github.as_ref(), SEARCH_QUERY)
    }

    async fn fetch_facts(&self, repo: &RepoDescriptor) -> Result<Option<RawPackage>, AppError> {
        let (repository, contributors, releases) = tokio::try_join!(
            self.github.get_repo(repo),
            self.github.list_contributors(repo),
            self.github.list_releases(repo),
        )?;

        let versions: Vec<RawVersion> = futures::stream::iter(releases)
            .map(|release| self.resolve_release(repo, release))
            .buffered(RELEASE_FETCH_CONCURRENCY)
            .filter_map(futures::future::ready)
            .collect()
            .await;

        if versions.is_empty() {
            debug!(repo = %repo, "No resolvable releases");
            return Ok(None);
        }

        let mut tags = vec!["platform:endstone".to_string(), "type:mod".to_string()];
        tags.extend(repository.topics.unwrap_or_default());

        Ok(Some(RawPackage {
            identifier: repo.identifier(),
            name: repository.name,
            description: repository.description.unwrap_or_default(),
            author: repository.owner.login,
            tags,
            avatar_url: repo.owner_avatar_url(),
            project_url: repo.project_url(),
            hotness: f64::from(repository.stargazers_count),
            contributors: map_contributors(contributors),
            versions,
            source: "github".to_string(),
            package_manager: String::new(),
        }))
    }
}
