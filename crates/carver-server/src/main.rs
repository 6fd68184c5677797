//! Carver server binary.

use anyhow::{Context, Result};
use carver_core::config::AppConfig;
use carver_server::sweep::spawn_cleanup_task;
use carver_server::{AppState, create_router};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Carver - file carving server for remote agents
#[derive(Parser, Debug)]
#[command(name = "carverd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CARVER_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Carver v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("CARVER_") && key != "CARVER_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: carverd --config /path/to/config.toml\n  \
             2. Environment variables: CARVER_SERVER__BIND=0.0.0.0:8080 \
             CARVER_AUTH__OPERATOR_TOKEN_HASH=YOUR_TOKEN_HASH carverd\n\n\
             See config/server.example.toml for example configuration.\n\
             Set CARVER_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("CARVER_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Initialize block object storage when configured
    let objects = carver_storage::from_config(&config.blocks)
        .await
        .context("failed to initialize block storage")?;

    if let Some(storage) = &objects {
        // Catch configuration and connectivity errors before accepting
        // requests rather than on the first block upload.
        storage
            .health_check()
            .await
            .context("block storage health check failed")?;
        tracing::info!(backend = storage.backend_name(), "Block storage initialized");
    } else {
        tracing::info!("Block payloads stored in metadata database");
    }

    // Initialize metadata store
    let store = carver_metadata::from_config(&config.metadata, objects)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let state = AppState::new(config.clone(), store);

    // Spawn the periodic cleanup sweep if enabled
    if let Some(interval) = state.cleanup_interval() {
        spawn_cleanup_task(state.service.clone(), interval);
        tracing::info!(
            interval_secs = interval.as_secs(),
            retention_hours = config.carve.retention_hours,
            "Cleanup sweep spawned"
        );
    } else {
        tracing::info!("Cleanup sweep disabled");
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
