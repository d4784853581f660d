use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use common::storage::store::{SortKey, SortOrder};
use retrieval_pipeline::SearchParams;
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError, ApiResponse};

/// Raw query string; every value is checked by hand so malformed input gets
/// the regular error envelope instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    q: Option<String>,
    per_page: Option<String>,
    page: Option<String>,
    sort: Option<String>,
    order: Option<String>,
}

fn parse_or<T: FromStr>(raw: Option<&str>, default: T, name: &str) -> Result<T, ApiError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ApiError::ValidationError(format!("invalid {name}"))),
    }
}

impl SearchQuery {
    fn into_params(self, default_per_page: usize) -> Result<SearchParams, ApiError> {
        let params = SearchParams {
            per_page: parse_or(self.per_page.as_deref(), default_per_page, "perPage")?,
            page: parse_or(self.page.as_deref(), 1, "page")?,
            sort: parse_or(self.sort.as_deref(), SortKey::default(), "sort")?,
            order: parse_or(self.order.as_deref(), SortOrder::default(), "order")?,
            q: self.q.unwrap_or_default(),
        };
        params.validate()?;
        Ok(params)
    }
}

pub async fn search_packages(
    State(state): State<ApiState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = query.into_params(state.config.default_per_page)?;
    let result = state.search.search(&params).await?;

    Ok(Json(ApiResponse::new(result)))
}

pub async fn get_package(
    State(state): State<ApiState>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let package = state
        .search
        .get(&identifier)
        .await
        .map_err(|err| match ApiError::from(err) {
            ApiError::NotFound(_) => ApiError::NotFound("package not found".to_string()),
            other => other,
        })?;

    Ok(Json(ApiResponse::new(package)))
}
