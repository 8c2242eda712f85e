use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use tripnest::app::{router, AppState};
use tripnest::config::{AppConfig, DatabaseBackend};
use tripnest::db::stores::Stores;

/// JSON backend for travel listings, stories and search.
#[derive(Debug, Parser)]
#[command(name = "tripnest", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults to ./tripnest.toml when present).
    #[arg(short, long, env = "TRIPNEST_CONFIG")]
    config: Option<PathBuf>,

    /// Seed sample content into empty collections, overriding `demo.seed`.
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripnest=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    tracing::info!("Starting Tripnest server...");

    let stores = match config.database.backend {
        DatabaseBackend::Mongodb => {
            let client = mongodb::Client::with_uri_str(&config.database.uri)
                .await
                .context("Failed to connect to MongoDB")?;
            let db = client.database(&config.database.name);
            let stores = Stores::mongo(&db)
                .await
                .context("Failed to prepare MongoDB collections")?;
            tracing::info!(
                "Connected to MongoDB at {} (database '{}')",
                config.database.uri,
                config.database.name
            );
            stores
        }
        DatabaseBackend::Memory => {
            tracing::warn!("Using the in-memory store, data is lost on exit");
            Stores::memory()
        }
    };

    if cli.seed || config.demo.seed {
        tripnest::demo_seeder::seed_demo_data(&stores).await;
    }

    let state = AppState::new(stores, config.auth.clone());
    let app = router(state, &config.server);

    let addr: SocketAddr = config
        .server
        .addr
        .parse()
        .with_context(|| format!("Invalid server.addr '{}'", config.server.addr))?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
