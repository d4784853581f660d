//! In-process fakes of the upstream APIs for adapter and pipeline tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use common::error::AppError;

use super::{
    github::{CodeSearchPage, GithubApi, Owner, Release, Repository, RepositoryContributor},
    goproxy::{GoProxyApi, GoVersionInfo},
    pypi::{PypiApi, PypiProject, PypiRelease},
    RepoDescriptor,
};

type FileKey = (RepoDescriptor, String, String);

fn file_key(repo: &RepoDescriptor, git_ref: &str, path: &str) -> FileKey {
    (repo.clone(), git_ref.to_string(), path.to_string())
}

pub fn repository(repo: &RepoDescriptor, stars: u32, topics: &[&str]) -> Repository {
    Repository {
        name: repo.repo.clone(),
        owner: Owner {
            login: repo.owner.clone(),
        },
        description: Some(format!("{} description", repo.repo)),
        stargazers_count: stars,
        topics: Some(topics.iter().map(ToString::to_string).collect()),
    }
}

pub fn release(tag: &str, published_at: &str) -> Release {
    Release {
        tag_name: tag.to_string(),
        created_at: "2000-01-01T00:00:00Z".to_string(),
        published_at: Some(published_at.to_string()),
    }
}

#[derive(Default)]
pub struct FakeGithub {
    search_pages: Vec<Vec<RepoDescriptor>>,
    fail_search: bool,
    repos: HashMap<RepoDescriptor, Repository>,
    contributors: HashMap<RepoDescriptor, Vec<RepositoryContributor>>,
    releases: HashMap<RepoDescriptor, Vec<Release>>,
    files: HashMap<FileKey, String>,
    failing_files: HashSet<FileKey>,
    search_calls: Mutex<Vec<u32>>,
}

impl FakeGithub {
    pub fn with_search_pages(mut self, pages: Vec<Vec<RepoDescriptor>>) -> Self {
        self.search_pages = pages;
        self
    }

    pub fn with_failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn with_repo(mut self, repository: Repository) -> Self {
        let key = RepoDescriptor::new(repository.owner.login.clone(), repository.name.clone());
        self.repos.insert(key, repository);
        self
    }

    pub fn with_contributors(mut self, repo: &RepoDescriptor, contributors: &[(&str, u64)]) -> Self {
        self.contributors.insert(
            repo.clone(),
            contributors
                .iter()
                .map(|(login, contributions)| RepositoryContributor {
                    login: Some((*login).to_string()),
                    contributions: *contributions,
                })
                .collect(),
        );
        self
    }

    pub fn with_releases(mut self, repo: &RepoDescriptor, releases: Vec<Release>) -> Self {
        self.releases.insert(repo.clone(), releases);
        self
    }

    pub fn with_file(mut self, repo: &RepoDescriptor, git_ref: &str, path: &str, body: &str) -> Self {
        self.files.insert(file_key(repo, git_ref, path), body.to_string());
        self
    }

    pub fn with_failing_file(mut self, repo: &RepoDescriptor, git_ref: &str, path: &str) -> Self {
        self.failing_files.insert(file_key(repo, git_ref, path));
        self
    }

    pub fn search_calls(&self) -> Vec<u32> {
        self.search_calls.lock().expect("search call log").clone()
    }
}

#[async_trait]
impl GithubApi for FakeGithub {
    async fn search_code(&self, _query: &str, page: u32) -> Result<CodeSearchPage, AppError> {
        self.search_calls.lock().expect("search call log").push(page);
        if self.fail_search {
            return Err(AppError::Fetch("search backend unavailable".into()));
        }

        let index = usize::try_from(page).unwrap_or(usize::MAX).saturating_sub(1);
        let repositories = self.search_pages.get(index).cloned().unwrap_or_default();
        Ok(CodeSearchPage {
            repositories,
            has_next: index.saturating_add(1) < self.search_pages.len(),
        })
    }

    async fn get_repo(&self, repo: &RepoDescriptor) -> Result<Repository, AppError> {
        self.repos
            .get(repo)
            .cloned()
            .ok_or_else(|| AppError::Fetch(format!("repository {repo} not found")))
    }

    async fn list_contributors(
        &self,
        repo: &RepoDescriptor,
    ) -> Result<Vec<RepositoryContributor>, AppError> {
        Ok(self.contributors.get(repo).cloned().unwrap_or_default())
    }

    async fn list_releases(&self, repo: &RepoDescriptor) -> Result<Vec<Release>, AppError> {
        Ok(self.releases.get(repo).cloned().unwrap_or_default())
    }

    async fn raw_file(
        &self,
        repo: &RepoDescriptor,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<String>, AppError> {
        let key = file_key(repo, git_ref, path);
        if self.failing_files.contains(&key) {
            return Err(AppError::Fetch(format!("{repo}@{git_ref}:{path} timed out")));
        }
        Ok(self.files.get(&key).cloned())
    }

    fn raw_url(&self, repo: &RepoDescriptor, git_ref: &str, path: &str) -> String {
        format!("https://raw.test/{}/{}/{git_ref}/{path}", repo.owner, repo.repo)
    }
}

#[derive(Default)]
pub struct FakeGoProxy {
    versions: HashMap<String, Vec<String>>,
    infos: HashMap<(String, String), GoVersionInfo>,
}

impl FakeGoProxy {
    /// Registers `version` with an info document; `time: None` lists the
    /// version without serving its info.
    pub fn with_version(mut self, module: &str, version: &str, time: Option<&str>) -> Self {
        self.versions
            .entry(module.to_string())
            .or_default()
            .push(version.to_string());
        if let Some(time) = time {
            self.infos.insert(
                (module.to_string(), version.to_string()),
                GoVersionInfo {
                    version: version.to_string(),
                    time: time.to_string(),
                },
            );
        }
        self
    }
}

#[async_trait]
impl GoProxyApi for FakeGoProxy {
    async fn list_versions(&self, module: &str) -> Result<Vec<String>, AppError> {
        Ok(self.versions.get(module).cloned().unwrap_or_default())
    }

    async fn version_info(&self, module: &str, version: &str) -> Result<GoVersionInfo, AppError> {
        self.infos
            .get(&(module.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| AppError::Fetch(format!("no info for {module}@{version}")))
    }
}

#[derive(Default)]
pub struct FakePypi {
    projects: HashMap<String, PypiProject>,
    releases: HashMap<(String, String), PypiRelease>,
    unavailable: bool,
}

impl FakePypi {
    /// Every request fails as if the registry were down.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project: PypiProject) -> Self {
        self.projects.insert(project.info.name.clone(), project);
        self
    }

    pub fn with_release(mut self, name: &str, version: &str, release: PypiRelease) -> Self {
        self.releases
            .insert((name.to_string(), version.to_string()), release);
        self
    }
}

#[async_trait]
impl PypiApi for FakePypi {
    async fn project(&self, name: &str) -> Result<Option<PypiProject>, AppError> {
        if self.unavailable {
            return Err(AppError::Fetch(format!("pypi lookup for {name} timed out")));
        }
        Ok(self.projects.get(name).cloned())
    }

    async fn release(&self, name: &str, version: &str) -> Result<Option<PypiRelease>, AppError> {
        Ok(self
            .releases
            .get(&(name.to_string(), version.to_string()))
            .cloned())
    }
}
