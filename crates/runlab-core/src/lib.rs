//! Shared data model for the runlab execution engine.
//!
//! Everything that crosses a crate or process boundary lives here: execution
//! requests and results, captured console entries, trace events and the
//! timeline they form, debugger states, the coordinator/sandbox wire protocol,
//! and the supported-language allow-list.

pub mod error;
pub mod id;
pub mod language;
pub mod model;
pub mod protocol;
pub mod result;

// Re-export commonly used types
pub use error::CoreError;
pub use id::RequestId;
pub use language::Language;
pub use model::{
    DebugState, ExecutionRequest, LogEntry, LogKind, Timeline, TraceData, TraceEvent, TraceLabel,
    Variable,
};
pub use protocol::{SandboxLimits, SandboxRequest, SandboxResponse, WorkerMessage};
pub use result::{ExecutionResult, ExecutionStatus};
