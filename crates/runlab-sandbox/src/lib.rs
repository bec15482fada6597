//! Process-isolated execution for runlab.
//!
//! Two halves live here:
//!
//! - the worker side ([`runtime`], [`worker`] and the `runlab-sandbox`
//!   binary), which reads one request from stdin, evaluates it and streams
//!   [`WorkerMessage`](runlab_core::WorkerMessage) lines to stdout
//! - the caller side ([`coordinator`]), which validates a request, spawns a
//!   fresh worker process per run, enforces the timeout by killing it and
//!   folds every outcome into one [`ExecutionResult`](runlab_core::ExecutionResult)

pub mod config;
pub mod coordinator;
pub mod error;
pub mod runtime;
pub mod worker;

pub use config::SandboxConfig;
pub use coordinator::Coordinator;
pub use error::{SandboxConfigError, SubmitError, WorkerError};
