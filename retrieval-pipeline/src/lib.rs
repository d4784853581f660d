#![allow(clippy::missing_docs_in_private_items)]

pub mod query;
pub mod search;

pub use query::compile;
pub use search::{SearchExecutor, SearchParams, SearchResult};
