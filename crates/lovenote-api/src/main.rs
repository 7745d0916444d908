//! LoveNote API Server
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use clap::Parser;
use lovenote_api::{create_router, state::AppState};
use lovenote_core::{AppConfig, LoggingConfig, ServerConfig};
use lovenote_store::PgStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

#[derive(Parser)]
#[command(name = "lovenote-api")]
#[command(about = "LoveNote REST API server")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Do not run embedded database migrations at startup
    #[arg(long)]
    skip_migrations: bool,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &logging.level;
        format!("lovenote_api={level},lovenote_store={level},audit=info,tower_http={level}").into()
    });

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn cors_layer(server: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let origins = server
        .cors_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("Invalid CORS origin: {origin}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path.clone())?.with_env_override()?,
        None => AppConfig::from_env()?,
    };

    init_tracing(&config.logging);
    config.validate().context("Invalid configuration")?;

    // Connect to the database
    let store = PgStore::connect(&config.database.url, config.database.pool_size)
        .await
        .context("Failed to connect to database")?;
    if cli.skip_migrations {
        tracing::warn!("Skipping database migrations");
    } else {
        store.migrate().await.context("Failed to run migrations")?;
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let timeout = Duration::from_secs(config.server.request_timeout_secs);
    let cors = cors_layer(&config.server)?;

    // Create application state
    let state = Arc::new(AppState::new(config, Arc::new(store))?);

    let app = create_router(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("LoveNote API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
