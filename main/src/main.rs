use std::{sync::Arc, time::Duration};

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{
    storage::{db::SurrealDbClient, store::PackageStore},
    utils::config::get_config,
};
use ingestion_pipeline::{
    default_adapters, run_crawl_loop, CrawlConfig, CrawlPipeline, Normalizer, NormalizerConfig,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
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

    // Ensure db is initialized
    db.ensure_initialized().await?;

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
        }
        ctrl_c_token.cancel();
    });

    let store = PackageStore::new(Arc::clone(&db));
    let sweeper = store.spawn_sweeper(
        Duration::from_secs(config.sweep_interval_secs.max(1)),
        shutdown.clone(),
    );

    let pipeline = Arc::new(CrawlPipeline::new(
        store,
        default_adapters(&config)?,
        Normalizer::new(NormalizerConfig::default()),
        CrawlConfig::from_app_config(&config),
    ));
    info!("Starting crawl scheduler");
    let crawler = tokio::spawn(run_crawl_loop(pipeline, shutdown.clone()));

    let app = app(ApiState::from_parts(db, config.clone()));

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
    {
        error!("Server error: {}", e);
    }

    // Stop background work once the server is gone, whatever the reason.
    shutdown.cancel();
    if let Err(e) = crawler.await? {
        error!("Crawl scheduler error: {}", e);
    }
    sweeper.await?;

    Ok(())
}

fn app(api_state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes_v1())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use common::utils::config::AppConfig;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_startup_with_in_memory_surrealdb() {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let config = AppConfig {
            surrealdb_namespace: namespace.into(),
            surrealdb_database: database.clone(),
            http_port: 0,
            ..AppConfig::default()
        };

        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        db.ensure_initialized()
            .await
            .expect("failed to initialize schema");

        // Building the adapter registry must not touch the network.
        let adapters = default_adapters(&config).expect("adapters from default config");
        assert_eq!(adapters.len(), 3);

        let app = app(ApiState::from_parts(db, config));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let ready_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("ready response");
        assert_eq!(ready_response.status(), StatusCode::OK);

        let search_response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/packages?q=platform:endstone")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("search response");
        assert_eq!(search_response.status(), StatusCode::OK);
    }
}
