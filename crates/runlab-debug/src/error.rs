//! Error types for the replay debugger.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebugError {
    /// Navigation was requested while the debugger is idle.
    #[error("debugger is not active")]
    NotDebugging,

    #[error("state index {index} is out of range (0..{len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Neither a timeline nor any executable source line is available.
    #[error("nothing to replay: no timeline and no executable lines")]
    NothingToReplay,
}
