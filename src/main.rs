use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

mod api;
mod config;
mod correction;
mod models;
mod services;
mod storage;
mod validation;

use config::Config;
use services::executor::{QueryExecutor, SqliteQueryExecutor};
use services::query_service::QueryService;
use services::result_cache::ResultCache;
use services::schema_provider::{SchemaProvider, StaticSchemaProvider};
use services::semantic_engine::SemanticQueryEngine;
use services::stat_service::StatService;
use storage::stat_repository::SqliteStatRepository;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting server on {}", config.server_address());

    // Statistics store
    let stat_repository = Arc::new(
        SqliteStatRepository::new(&config.storage.url)
            .await
            .map_err(|e| {
                error!("Failed to initialize statistics store: {}", e);
                e
            })?,
    );

    // Schema registry, optionally seeded from a models file
    let schema_provider: Arc<dyn SchemaProvider> = if config.storage.models_file.is_empty() {
        Arc::new(StaticSchemaProvider::new())
    } else {
        Arc::new(StaticSchemaProvider::from_file(&config.storage.models_file)?)
    };

    // Backend executors, polled in registration order
    let executors: Vec<Arc<dyn QueryExecutor>> =
        vec![Arc::new(SqliteQueryExecutor::new(&config.storage.url)?)];

    let engine = Arc::new(SemanticQueryEngine::new(
        Arc::clone(&schema_provider),
        executors,
    ));
    let cache = Arc::new(ResultCache::new(
        config.cache.max_size,
        config.cache.ttl_secs,
    ));
    let stats = Arc::new(StatService::new(stat_repository, schema_provider));
    let query_service = Arc::new(QueryService::new(
        engine,
        cache,
        stats,
        config.cache.enable,
    ));

    // Create router with state
    let app: Router = api::routes::create_router_with_state(query_service);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
