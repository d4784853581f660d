pub mod db;
pub mod filter;
pub mod indexes;
pub mod store;
pub mod types;
