use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use balance_engine::{
    cache::BalanceCache, config::Config, database::Database, handlers, metrics, AppState,
};
use dotenv::dotenv;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .json()
        .init();

    info!("Starting Balance Engine...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    info!("Configuration loaded successfully");

    // Initialize database
    let db = Arc::new(
        Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .context("Failed to connect to database")?,
    );

    if config.database.run_migrations {
        db.run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    db.ping().await.context("Database ping failed")?;

    info!("Database connected successfully");

    // Initialize Redis
    let redis_client = redis::Client::open(config.redis.url.clone())
        .context("Failed to create Redis client")?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("Failed to connect to Redis")?;
    let cache = Arc::new(BalanceCache::new(redis_conn, config.engine.balance_ttl_secs));
    cache.ping().await.context("Redis ping failed")?;

    info!("Redis connected successfully");

    metrics::init();

    let state = web::Data::new(AppState::new(
        db.clone(),
        cache,
        db,
        config.engine.clone(),
        config.server.request_timeout(),
    ));

    let server_config = config.server.clone();

    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(handlers::configure_routes)
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await?;

    Ok(())
}
