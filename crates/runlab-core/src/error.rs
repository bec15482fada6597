//! Core error types for runlab-core.

use thiserror::Error;

/// Errors produced while building core model values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Trace event timestamps must strictly increase within one timeline.
    #[error("timeline is not strictly ordered: event {index} has timestamp {found} after {previous}")]
    NonMonotonicTimeline {
        index: usize,
        previous: u64,
        found: u64,
    },
}
