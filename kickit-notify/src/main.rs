use kickit_notify::config::EngineConfig;
use kickit_notify::logging::init_logging;
use kickit_notify::services::ServiceContainer;
use kickit_notify::utils::http_client::install_rustls_provider;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = EngineConfig::from_env()?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let (logging, _log_guard) = init_logging(&config.log_dir)?;
    let cancel_token = CancellationToken::new();
    logging.start_retention_cleanup(cancel_token.clone());

    install_rustls_provider();

    let services = ServiceContainer::from_config(&config).await?;
    services.start();

    info!(
        database_url = %config.database_url,
        push_configured = services.stats().push_configured,
        "kickit-notify started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    cancel_token.cancel();
    services.shutdown().await;

    Ok(())
}
