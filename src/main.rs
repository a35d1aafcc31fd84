use anyhow::Context;
use tracing_subscriber::EnvFilter;
use users_api::{config::config, database::UserStore, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up USERS_API_PORT, APP_ENV, etc.
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = config();
    tracing::info!("Starting users API in {:?} mode", config.environment);

    let store = UserStore::seeded();
    let app = server::app(store);

    let bind_addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("users API listening on http://{}", bind_addr);

    server::serve(listener, app, &config.server, server::shutdown_signal()).await;

    tracing::info!("all systems off");
    Ok(())
}
