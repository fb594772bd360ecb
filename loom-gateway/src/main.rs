//! Loom Gateway Server Entry Point
//!
//! Bootstraps configuration from the environment, wires the shared state
//! (database pool, provider cache, trace sink, conversation manager) and
//! serves the Axum router until ctrl-c, then drains the trace queue
//! bounded by the shutdown timeout.

use loom_gateway::{
    create_router, ApiError, ApiResult, AppState, AuthConfig, DbClient, DbConfig, GatewayConfig,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ApiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = GatewayConfig::from_env();
    let auth = AuthConfig::from_env();
    auth.warn_on_weak_secrets();

    let db = DbClient::from_config(&DbConfig::from_env())?;
    if let Err(e) = db.ping().await {
        tracing::warn!(error = %e, "database not reachable at startup");
    }

    let shutdown_timeout = config.shutdown_timeout;
    let addr = config.bind_addr();
    let (state, trace_drainer) = AppState::build(db, config, auth)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!(%addr, "Starting Loom gateway");

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal(format!("Server error: {e}")))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    // Drain the trace queue, bounded by the shutdown timeout.
    if let Some(drainer) = trace_drainer {
        if tokio::time::timeout(shutdown_timeout, drainer).await.is_err() {
            tracing::warn!("trace queue did not drain within the shutdown timeout");
        }
    }

    Ok(())
}
