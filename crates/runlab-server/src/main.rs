//! Binary entrypoint for the runlab HTTP server.
//!
//! Reads configuration from environment variables:
//! - `RUNLAB_PORT`: listen port (default: "3000")
//! - `RUNLAB_SESSION_IDLE_SECS`: idle time before a debug session is
//!   dropped (default: 1800)
//! - `RUNLAB_TIMEOUT_MS`, `RUNLAB_SANDBOX_BIN`, `RUNLAB_MAX_*`,
//!   `RUNLAB_SANDBOX_LOG`: sandbox settings, see [`SandboxConfig::from_env`]
//! - `RUST_LOG`: server log filter (default: "info")

use std::time::Duration;

use runlab_sandbox::SandboxConfig;
use runlab_server::router::build_router;
use runlab_server::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SandboxConfig::from_env()?;
    let port = std::env::var("RUNLAB_PORT").unwrap_or_else(|_| "3000".to_string());
    tracing::info!(
        worker = %config.worker_path.display(),
        timeout_ms = config.timeout_ms(),
        "sandbox configured"
    );

    let idle_secs: u64 = match std::env::var("RUNLAB_SESSION_IDLE_SECS") {
        Ok(raw) => raw.trim().parse()?,
        Err(_) => 1800,
    };

    let state = AppState::new(config);
    state
        .sessions
        .start_idle_sweep(Duration::from_secs(idle_secs), Duration::from_secs(60));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("runlab server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
