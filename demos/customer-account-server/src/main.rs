use anyhow::{Context, Result};
use customer_account_server::config::Config;
use customer_account_server::{AppState, build_router, init_tracing, with_bootstrap_logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let config = with_bootstrap_logging(std::io::stderr, Config::load)?;
    init_tracing(&config.logging);

    info!("Starting customer account server");

    let state = AppState::new(&config)?;
    let app = build_router(state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on http://{}", addr);
    info!("Start a login with GET or POST /authorize");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
