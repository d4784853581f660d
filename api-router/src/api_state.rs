use std::sync::Arc;

use common::{
    storage::{db::SurrealDbClient, store::PackageStore},
    utils::config::AppConfig,
};
use retrieval_pipeline::SearchExecutor;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub search: SearchExecutor,
}

impl ApiState {
    pub async fn new(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let surreal_db_client = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );

        surreal_db_client.ensure_initialized().await?;

        Ok(Self::from_parts(surreal_db_client, config.clone()))
    }

    /// Builds the state over an already initialized database.
    pub fn from_parts(db: Arc<SurrealDbClient>, config: AppConfig) -> Self {
        let store = PackageStore::new(Arc::clone(&db));
        Self {
            db,
            config,
            search: SearchExecutor::new(store),
        }
    }
}
