use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use common::error::AppError;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use regex::Regex;
use tracing::debug;

use crate::{
    manifest::{ManifestMigrator, ManifestV3},
    normalize::{RawPackage, RawVersion},
};

use super::{
    github::{search_repositories, GithubApi},
    goproxy::{clean_version, GoProxyApi},
    map_contributors, RepoDescriptor, SourceAdapter,
};

const SEARCH_QUERY: &str = r#"path:/ filename:tooth.json "format_version" 2 "tooth" "version" "info" "name" "description" "author" "tags" "github.com/LiteLDev/LeviLamina""#;
const MANIFEST_PATH: &str = "tooth.json";
const BUILD_SCRIPT_PATH: &str = "xmake.lua";
const VERSION_FETCH_CONCURRENCY: usize = 4;

static ABSOLUTE_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:[a-z+]+:)?//").ok());

fn is_absolute_url(url: &str) -> bool {
    ABSOLUTE_URL
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(url))
}

/// LeviLamina mods: repositories carrying a v2 `tooth.json` at their root,
/// versioned through the Go module proxy.
pub struct LeviLaminaAdapter {
    github: Arc<dyn GithubApi>,
    goproxy: Arc<dyn GoProxyApi>,
    migrator: ManifestMigrator,
}

impl LeviLaminaAdapter {
    pub fn new(
        github: Arc<dyn GithubApi>,
        goproxy: Arc<dyn GoProxyApi>,
        migrator: ManifestMigrator,
    ) -> Self {
        Self {
            github,
            goproxy,
            migrator,
        }
    }

    fn is_platform_repo(repo: &RepoDescriptor) -> bool {
        repo.owner == "LiteLDev" && repo.repo == "LeviLamina"
    }

    async fn manifest(&self, repo: &RepoDescriptor) -> Result<ManifestV3, AppError> {
        let raw = self
            .github
            .raw_file(repo, "HEAD", MANIFEST_PATH)
            .await?
            .ok_or_else(|| AppError::Fetch(format!("{repo} has no {MANIFEST_PATH} at HEAD")))?;

        Ok(self.migrator.migrate_json(&raw)?)
    }

    async fn has_build_script(&self, repo: &RepoDescriptor) -> Result<bool, AppError> {
        match self.github.raw_file(repo, "HEAD", BUILD_SCRIPT_PATH).await {
            Ok(file) => Ok(file.is_some()),
            Err(err) => {
                debug!(repo = %repo, error = %err, "Build script probe failed; assuming absent");
                Ok(false)
            }
        }
    }

    async fn versions(&self, repo: &RepoDescriptor) -> Result<Vec<RawVersion>, AppError> {
        let module = repo.module_path();
        let listed = self.goproxy.list_versions(&module).await?;

        let resolved: Vec<Option<RawVersion>> = futures::stream::iter(listed)
            .map(|listed_version| {
                let module = module.as_str();
                async move {
                    match self.goproxy.version_info(module, &listed_version).await {
                        Ok(info) => Some(RawVersion {
                            version: clean_version(&info.version),
                            released_at: info.time,
                            source: "github".to_string(),
                            package_manager: "lip".to_string(),
                            platform_version_requirement: None,
                        }),
                        Err(err) => {
                            debug!(
                                module,
                                version = %listed_version,
                                error = %err,
                                "Skipping unresolvable module version"
                            );
                            None
                        }
                    }
                }
            })
            .buffered(VERSION_FETCH_CONCURRENCY)
            .collect()
            .await;

        Ok(resolved.into_iter().flatten().collect())
    }

    fn avatar_url(&self, repo: &RepoDescriptor, declared: &str) -> String {
        if declared.is_empty() {
            repo.owner_avatar_url()
        } else if is_absolute_url(declared) {
            declared.to_string()
        } else {
            self.github.raw_url(repo, "HEAD", declared)
        }
    }
}

#[async_trait]
impl SourceAdapter for LeviLaminaAdapter {
    fn name(&self) -> &'static str {
        "levilamina"
    }

    fn discover(&self) -> BoxStream<'_, Result<RepoDescriptor, AppError>> {
        Box::pin(
            search_repositories(self.github.as_ref(), SEARCH_QUERY)
                .try_filter(|repo| futures::future::ready(!Self::is_platform_repo(repo))),
        )
    }

    async fn fetch_facts(&self, repo: &RepoDescriptor) -> Result<Option<RawPackage>, AppError> {
        let (repository, contributors, manifest, mut versions, has_build_script) = tokio::try_join!(
            self.github.get_repo(repo),
            self.github.list_contributors(repo),
            self.manifest(repo),
            self.versions(repo),
            self.has_build_script(repo),
        )?;

        if versions.is_empty() {
            debug!(repo = %repo, "No module versions published");
            return Ok(None);
        }

        // The HEAD manifest only describes the version it declares.
        if !manifest.platform_requirement.is_empty() {
            let head_version = clean_version(&manifest.version);
            for version in versions.iter_mut().filter(|v| v.version == head_version) {
                version.platform_version_requirement = Some(manifest.platform_requirement.clone());
            }
        }

        let mut tags = vec!["platform:levilamina".to_string()];
        if has_build_script {
            tags.push("type:mod".to_string());
        }
        tags.extend(manifest.info.tags.iter().cloned());
        tags.extend(repository.topics.unwrap_or_default());

        Ok(Some(RawPackage {
            identifier: repo.identifier(),
            name: manifest.info.name.clone(),
            description: manifest.info.description.clone(),
            author: repo.owner.clone(),
            tags,
            avatar_url: self.avatar_url(repo, &manifest.info.avatar_url),
            project_url: repo.project_url(),
            hotness: f64::from(repository.stargazers_count),
            contributors: map_contributors(contributors),
            versions,
            source: "github".to_string(),
            package_manager: "lip".to_string(),
        }))
    }
}
