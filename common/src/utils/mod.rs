pub mod config;
pub mod timestamp;
