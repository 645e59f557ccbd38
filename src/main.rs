use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use datasource_router::api;
use datasource_router::config::Config;
use datasource_router::services::DynamicDataSource;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting datasource router on {}", config.server_address());

    let engine = DynamicDataSource::from_config(&config).map_err(|e| {
        error!("Failed to initialize dynamic datasource: {}", e);
        e
    })?;

    // Create router with state
    let app: Router = api::routes::create_router_with_state(Arc::new(engine));

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
