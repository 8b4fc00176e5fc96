use stepdoc::api::{ApiServer, ApiServerConfig};
use stepdoc::config::AppConfig;
use stepdoc::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before reading any config.
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default();

    // Guard must outlive the server so file logs flush on exit.
    let _log_guard = stepdoc::logging::init(config.log_dir.as_deref());

    let container = ServiceContainer::build(&config).await?;

    let server = ApiServer::new(ApiServerConfig::from_env_or_default(), container.state());
    let cancel_token = server.cancel_token();

    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
        cancel_token.cancel();
    });

    server.run().await?;

    container.shutdown().await;
    Ok(())
}
