use anyhow::{Context, Result};
use clap::Parser;
use config_service::config::{Cli, Config};
use config_service::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let config = Config::from_env()
        .context("Failed to load configuration")?
        .apply_cli(cli);
    config.validate().context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("config_service={},tower_http=debug", config.log_level.to_lowercase()).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = if config.uses_redis() { "redis" } else { "memory" };
    tracing::info!("Starting config service");
    tracing::info!(
        bind_addr = %config.bind_addr,
        store,
        rate_limit_per_second = config.rate_limit_per_second,
        rate_limit_burst = config.rate_limit_burst,
        "Configuration loaded"
    );

    let server = Server::new(config)
        .await
        .context("Failed to create server")?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
