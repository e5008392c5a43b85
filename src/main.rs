use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crm_broker::{api, AppState, Config, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crm_broker=info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::from_env()?;
    info!("crm-broker v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}:{}", config.host, config.port);
    match &config.token_file {
        Some(path) => info!("Persisting tokens to {}", path.display()),
        None => info!("Token persistence disabled; tokens live in memory only"),
    }

    let state: SharedState = Arc::new(AppState::from_config(config.clone())?);

    // Pick up the token from a previous run, if any
    if state.store.load().await.is_none() {
        info!("Not authenticated yet; visit {}/auth to connect", config.base_url);
    }

    // Build router
    let app = api::router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready ✓");
    axum::serve(listener, app).await?;

    Ok(())
}
