//! Gateway entrypoint: load configuration, wire up shared state, serve the HTTP API.

use anyhow::Result;
use opipolix_gateway::api::{create_app, AppState};
use opipolix_gateway::Config;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;
    let bind_addr = config.bind_addr.clone();

    let state = AppState::new(config);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "opipolix-gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}
