//! `runlab-sandbox` worker binary.
//!
//! Spawned by the coordinator once per run with a cleared environment.
//! stdin carries the request, stdout is the protocol channel, and
//! diagnostics go to stderr filtered by `RUNLAB_SANDBOX_LOG` (default
//! `warn`).

use std::process::ExitCode;

use runlab_sandbox::config::ENV_SANDBOX_LOG;
use runlab_sandbox::worker;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env(ENV_SANDBOX_LOG).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match worker::serve(std::io::stdin(), std::io::stdout()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("sandbox worker failed: {}", err);
            ExitCode::FAILURE
        }
    }
}
