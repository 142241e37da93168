use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use translation_service::api::{self, AppState};
use translation_service::config::Config;
use translation_service::db::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_service=info".parse()?),
        )
        .init();

    info!("Starting translation service");

    // Load configuration from environment
    let config = Config::from_env()?;

    // Open the database and run migrations
    let store = Store::connect(&config.database_url).await?;
    info!("Database ready at {}", config.database_url);

    let state = Arc::new(AppState::new(config.clone(), store));
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind((config.bind_addr.as_str(), config.port)).await?;
    info!("Listening on {}:{}", config.bind_addr, config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
