/// Aurora Moderation server
///
/// Runs the moderation HTTP API and its background jobs over a SQLite store.

use anyhow::Context;
use aurora_moderation::{config::ServerConfig, jobs, server, AppContext};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (reads .env first)
    let config = ServerConfig::from_env().context("Failed to load configuration")?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "aurora_moderation=debug,tower_http=debug".into());
    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Aurora Moderation v{}", env!("CARGO_PKG_VERSION"));

    // Create application context
    let ctx = AppContext::new(config)
        .await
        .context("Failed to initialize application context")?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone())
        .await
        .context("HTTP server stopped")?;

    Ok(())
}
