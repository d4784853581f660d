use std::time::Duration;

use common::error::AppError;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use url::Url;

const RETRY_ATTEMPTS: usize = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("package-index/", env!("CARGO_PKG_VERSION"));

pub fn build_client() -> Result<Client, AppError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(AppError::from)
}

/// Parses a configured base URL and drops any trailing slash so paths can be
/// appended with `format!`.
pub fn base_url(raw: &str) -> Result<String, AppError> {
    let parsed = Url::parse(raw)
        .map_err(|err| AppError::Validation(format!("invalid base url {raw}: {err}")))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout()
        || err.is_connect()
        || err
            .status()
            .is_some_and(|status| status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS)
}

/// Sends the request built by `build`, retrying transport failures, 5xx and
/// 429 responses with jittered exponential backoff. Other statuses are
/// returned to the caller untouched.
pub async fn send_with_retry<F>(build: F) -> Result<Response, reqwest::Error>
where
    F: Fn() -> RequestBuilder,
{
    let strategy = ExponentialBackoff::from_millis(100)
        .map(jitter)
        .take(RETRY_ATTEMPTS);

    RetryIf::spawn(
        strategy,
        || {
            let request = build();
            async move {
                let response = request.send().await?;
                let status = response.status();
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    return response.error_for_status();
                }
                Ok(response)
            }
        },
        is_transient,
    )
    .await
}

/// Fetches a text document, mapping 404 to `None`.
pub async fn get_optional_text(client: &Client, url: &str) -> Result<Option<String>, AppError> {
    let response = send_with_retry(|| client.get(url)).await?;
    match response.status() {
        StatusCode::NOT_FOUND => Ok(None),
        status if status.is_success() => Ok(Some(response.text().await?)),
        status => Err(AppError::Fetch(format!("GET {url} returned {status}"))),
    }
}

/// Fetches and decodes a JSON document, mapping 404 and 204 to `None`.
pub async fn get_optional_json<T>(
    client: &Client,
    url: &str,
    headers: &[(header::HeaderName, String)],
) -> Result<Option<T>, AppError>
where
    T: serde::de::DeserializeOwned,
{
    let response = send_with_retry(|| {
        headers
            .iter()
            .fold(client.get(url), |req, (name, value)| req.header(name, value))
    })
    .await?;

    match response.status() {
        StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
        status if status.is_success() => Ok(Some(response.json::<T>().await?)),
        status => Err(AppError::Fetch(format!("GET {url} returned {status}"))),
    }
}
