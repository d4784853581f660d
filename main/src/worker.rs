use std::sync::Arc;

use common::{
    storage::{db::SurrealDbClient, store::PackageStore},
    utils::config::get_config,
};
use ingestion_pipeline::{
    default_adapters, run_crawl_loop, CrawlConfig, CrawlPipeline, Normalizer, NormalizerConfig,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
        }
        ctrl_c_token.cancel();
    });

    let crawl_config = CrawlConfig::from_app_config(&config);
    let adapters = default_adapters(&config)?;
    info!(
        adapters = adapters.len(),
        interval_secs = crawl_config.interval.as_secs(),
        "Starting crawl worker"
    );

    let pipeline = Arc::new(CrawlPipeline::new(
        PackageStore::new(db),
        adapters,
        Normalizer::new(NormalizerConfig::default()),
        crawl_config,
    ));

    let stats = run_crawl_loop(pipeline, shutdown).await?;
    info!(
        cycles = stats.cycles_started,
        skipped = stats.triggers_skipped,
        "Crawl worker stopped"
    );
    Ok(())
}
