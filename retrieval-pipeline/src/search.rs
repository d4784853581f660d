use common::{
    error::AppError,
    storage::{
        store::{PackageStore, SortKey, SortOrder},
        types::package::PackageRecord,
    },
};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::query;

pub const MAX_PER_PAGE: usize = 100;
pub const DEFAULT_PER_PAGE: usize = 20;

/// Validated search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub q: String,
    pub per_page: usize,
    pub page: usize,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            q: String::new(),
            per_page: DEFAULT_PER_PAGE,
            page: 1,
            sort: SortKey::default(),
            order: SortOrder::default(),
        }
    }
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=MAX_PER_PAGE).contains(&self.per_page) {
            return Err(AppError::Validation(format!(
                "invalid perPage: must be between 1 and {MAX_PER_PAGE}"
            )));
        }
        if self.page < 1 {
            return Err(AppError::Validation(
                "invalid page: must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub page_index: usize,
    pub total_pages: u64,
    pub items: Vec<PackageRecord>,
}

pub fn total_pages(matches: u64, per_page: usize) -> u64 {
    let per_page = u64::try_from(per_page).unwrap_or(u64::MAX).max(1);
    matches.div_ceil(per_page)
}

#[derive(Clone)]
pub struct SearchExecutor {
    store: PackageStore,
}

impl SearchExecutor {
    pub fn new(store: PackageStore) -> Self {
        Self { store }
    }

    #[instrument(skip_all, fields(q = %params.q, page = params.page, per_page = params.per_page))]
    pub async fn search(&self, params: &SearchParams) -> Result<SearchResult, AppError> {
        params.validate()?;

        let filter = query::compile(&params.q);
        debug!(%filter, "Compiled search query");

        let page = self
            .store
            .query(
                &filter,
                params.sort,
                params.order,
                params.offset(),
                params.per_page,
            )
            .await?;

        Ok(SearchResult {
            page_index: params.page,
            total_pages: total_pages(page.total, params.per_page),
            items: page.items,
        })
    }

    pub async fn get(&self, identifier: &str) -> Result<PackageRecord, AppError> {
        self.store
            .fetch(identifier)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("package {identifier} not found")))
    }
}
