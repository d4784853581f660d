use async_trait::async_trait;
use common::error::AppError;
use futures::stream::BoxStream;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{
    http::{base_url, build_client, get_optional_json, get_optional_text, send_with_retry},
    RepoDescriptor,
};

pub const SEARCH_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Owner {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: Owner,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u32,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryContributor {
    #[serde(default)]
    pub login: Option<String>,
    pub contributions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub tag_name: String,
    pub created_at: String,
    #[serde(default)]
    pub published_at: Option<String>,
}

impl Release {
    pub fn released_at(&self) -> &str {
        self.published_at.as_deref().unwrap_or(&self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeSearchPage {
    pub repositories: Vec<RepoDescriptor>,
    pub has_next: bool,
}

#[derive(Deserialize)]
struct CodeSearchResponse {
    items: Vec<CodeSearchItem>,
}

#[derive(Deserialize)]
struct CodeSearchItem {
    repository: CodeSearchRepository,
}

#[derive(Deserialize)]
struct CodeSearchRepository {
    name: String,
    owner: Owner,
}

/// The slice of the GitHub REST API the adapters depend on.
#[async_trait]
pub trait GithubApi: Send + Sync {
    async fn search_code(&self, query: &str, page: u32) -> Result<CodeSearchPage, AppError>;

    async fn get_repo(&self, repo: &RepoDescriptor) -> Result<Repository, AppError>;

    async fn list_contributors(
        &self,
        repo: &RepoDescriptor,
    ) -> Result<Vec<RepositoryContributor>, AppError>;

    async fn list_releases(&self, repo: &RepoDescriptor) -> Result<Vec<Release>, AppError>;

    /// Raw file content at `git_ref`, or `None` when the file does not exist there.
    async fn raw_file(
        &self,
        repo: &RepoDescriptor,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<String>, AppError>;

    fn raw_url(&self, repo: &RepoDescriptor, git_ref: &str, path: &str) -> String;
}

/// Streams every repository matched by a code search, one page at a time,
/// until the API stops advertising a next page. Failures surface as
/// [`AppError::Discovery`] and end the stream.
pub fn search_repositories<'a>(
    api: &'a dyn GithubApi,
    query: &'a str,
) -> BoxStream<'a, Result<RepoDescriptor, AppError>> {
    Box::pin(async_stream::try_stream! {
        let mut page = 1_u32;
        loop {
            debug!(page, "Searching code");
            let result = api
                .search_code(query, page)
                .await
                .map_err(|err| AppError::Discovery(format!("code search page {page}: {err}")))?;

            for repo in result.repositories {
                yield repo;
            }

            if !result.has_next {
                break;
            }
            page = page.saturating_add(1);
        }
    })
}

fn has_next_page(headers: &header::HeaderMap) -> bool {
    headers
        .get(header::LINK)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|link| link.contains("rel=\"next\""))
}

pub struct GithubClient {
    http: Client,
    api_base: String,
    raw_base: String,
    token: String,
}

impl GithubClient {
    pub fn new(api_base: &str, raw_base: &str, token: &str) -> Result<Self, AppError> {
        Ok(Self {
            http: build_client()?,
            api_base: base_url(api_base)?,
            raw_base: base_url(raw_base)?,
            token: token.to_string(),
        })
    }

    fn api_headers(&self) -> Vec<(header::HeaderName, String)> {
        let mut headers = vec![(
            header::ACCEPT,
            "application/vnd.github+json".to_string(),
        )];
        if !self.token.is_empty() {
            headers.push((header::AUTHORIZATION, format!("Bearer {}", self.token)));
        }
        headers
    }

    async fn get_json<T>(&self, url: &str) -> Result<Option<T>, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        get_optional_json(&self.http, url, &self.api_headers()).await
    }
}

#[async_trait]
impl GithubApi for GithubClient {
    async fn search_code(&self, query: &str, page: u32) -> Result<CodeSearchPage, AppError> {
        let url = format!("{}/search/code", self.api_base);
        let headers = self.api_headers();
        let page_param = page.to_string();
        let per_page = SEARCH_PAGE_SIZE.to_string();

        let response = send_with_retry(|| {
            headers
                .iter()
                .fold(self.http.get(&url), |req, (name, value)| req.header(name, value))
                .query(&[
                    ("q", query),
                    ("per_page", per_page.as_str()),
                    ("page", page_param.as_str()),
                ])
        })
        .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AppError::Discovery(format!("code search returned {status}")));
        }

        let has_next = has_next_page(response.headers());
        let body: CodeSearchResponse = response.json().await?;

        Ok(CodeSearchPage {
            repositories: body
                .items
                .into_iter()
                .map(|item| RepoDescriptor::new(item.repository.owner.login, item.repository.name))
                .collect(),
            has_next,
        })
    }

    async fn get_repo(&self, repo: &RepoDescriptor) -> Result<Repository, AppError> {
        let url = format!("{}/repos/{}/{}", self.api_base, repo.owner, repo.repo);
        self.get_json(&url)
            .await?
            .ok_or_else(|| AppError::Fetch(format!("repository {repo} not found")))
    }

    async fn list_contributors(
        &self,
        repo: &RepoDescriptor,
    ) -> Result<Vec<RepositoryContributor>, AppError> {
        let url = format!(
            "{}/repos/{}/{}/contributors?per_page=100",
            self.api_base, repo.owner, repo.repo
        );
        Ok(self.get_json(&url).await?.unwrap_or_default())
    }

    async fn list_releases(&self, repo: &RepoDescriptor) -> Result<Vec<Release>, AppError> {
        let url = format!(
            "{}/repos/{}/{}/releases?per_page=100",
            self.api_base, repo.owner, repo.repo
        );
        Ok(self.get_json(&url).await?.unwrap_or_default())
    }

    async fn raw_file(
        &self,
        repo: &RepoDescriptor,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<String>, AppError> {
        get_optional_text(&self.http, &self.raw_url(repo, git_ref, path)).await
    }

    fn raw_url(&self, repo: &RepoDescriptor, git_ref: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_base,
            repo.owner,
            repo.repo,
            git_ref,
            path.trim_start_matches('/')
        )
    }
}
