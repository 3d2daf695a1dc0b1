//! Binary entrypoint for the oplock HTTP server.
//!
//! Configuration is read from the environment; see [`oplock_server::config`].
//! Log verbosity follows `RUST_LOG` (default `info`).

use oplock_server::config::ServerConfig;
use oplock_server::router::build_router;
use oplock_server::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let state = AppState::new(&config)?;
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        %addr,
        stale_after_secs = config.staleness.threshold.as_secs(),
        debug_endpoint = config.debug_endpoint,
        "oplock server starting"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
