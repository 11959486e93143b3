use axum_helpers::server::{create_production_app, health_router};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_incidents::OpenAIEmbeddingProvider;
use migration::Migrator;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod api;
mod config;
mod openapi;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Install color-eyre first for colored error output (before any fallible operations)
    install_color_eyre();

    let config = Config::from_env()?;

    init_tracing(&config.environment);

    let db = database::postgres::connect_from_config_with_retry(config.database.clone(), None)
        .await
        .map_err(|e| eyre::eyre!("PostgreSQL connection failed: {}", e))?;

    if config.run_migrations {
        database::postgres::run_migrations::<Migrator>(&db, config.app.name)
            .await
            .map_err(|e| eyre::eyre!("Migrations failed: {}", e))?;
    }

    info!(
        model = %config.embedding.model,
        dimension = config.embedding.dimension,
        url = %config.embedding.base_url,
        "Using embedding provider"
    );
    if config.embedding.dimension != migration::EMBEDDING_DIMENSION {
        tracing::warn!(
            configured = config.embedding.dimension,
            column = migration::EMBEDDING_DIMENSION,
            "Embedding dimension does not match the database column; writes will fail"
        );
    }

    let embedder = OpenAIEmbeddingProvider::new(config.embedding.clone())
        .map_err(|e| eyre::eyre!("Embedding client setup failed: {}", e))?;

    let state = AppState {
        config,
        db,
        embedder: Arc::new(embedder),
    };

    let api_routes = api::routes(&state);

    // create_router adds docs/middleware to our composed routes
    let router = axum_helpers::create_router::<openapi::ApiDoc>(api_routes, &state.config.server)?;

    // - /health: liveness check with app name/version
    // - /ready: database reachable with PostGIS and pgvector installed
    let app = router
        .merge(health_router(state.config.app))
        .merge(api::ready_router(state.clone()));

    info!("Starting incidents API with production-ready shutdown (30s timeout)");

    create_production_app(
        app,
        &state.config.server,
        Duration::from_secs(30),
        async move {
            info!("Shutting down: closing database connections");
            match state.db.close().await {
                Ok(_) => info!("PostgreSQL connection closed successfully"),
                Err(e) => tracing::error!("Error closing PostgreSQL: {}", e),
            }
        },
    )
    .await
    .map_err(|e| eyre::eyre!("Server error: {}", e))?;

    info!("Incidents API shutdown complete");
    Ok(())
}
