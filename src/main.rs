//! Conductor CLI entry point.
//!
//! Loads the TOML configuration and runs the HTTP orchestrator.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use conductor_common::ConfigFile;
use conductor_server::ConductorServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,conductor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting conductor");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".into());
    let config = ConfigFile::from_file(&config_path)
        .with_context(|| format!("Failed to load configuration from '{config_path}'"))?;

    info!(
        config = %config_path,
        port = %config.server.port,
        routes = config.routes.len(),
        cache_ttl = config.cache.ttl,
        cache_size = config.cache.size,
        "Configuration loaded"
    );

    let server = ConductorServer::new(&config)?;

    info!("Server initialized. Built-in endpoints:");
    info!("  GET  /health   - Health check");
    info!("  GET  /stats    - Server and cache statistics");
    for (path, route) in &config.routes {
        info!("  ANY  {path}  -> {}", route.wasm_file);
    }

    server.run().await?;

    Ok(())
}
