//! Error types for the sandbox crate.
//!
//! Failures of the untrusted run itself are never errors here: they end up
//! in an [`ExecutionResult`](runlab_core::ExecutionResult). These enums cover
//! only misconfiguration, refused submissions and worker plumbing.

use std::io;

use runlab_core::RequestId;
use thiserror::Error;

/// Configuration could not be assembled from the environment.
#[derive(Debug, Error)]
pub enum SandboxConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("cannot locate the sandbox worker binary: {0}")]
    WorkerPath(#[source] io::Error),
}

/// A submission the coordinator refused to dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Another run is still outstanding on the same coordinator.
    #[error("a run is already in flight ({in_flight})")]
    Busy { in_flight: RequestId },
}

/// Failures inside the worker process.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] serde_json::Error),
}
