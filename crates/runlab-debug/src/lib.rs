//! Trace-replay debugger for runlab.
//!
//! - [`BreakpointSet`] holds the lines the user wants to pause on.
//! - [`ReplayDebugger`] steps through the `line` events of a recorded
//!   [`Timeline`](runlab_core::Timeline), or through states reconstructed by
//!   the [`heuristic`] scanner when no timeline exists.
//!
//! Nothing here executes code: replay is pure navigation over states that
//! already exist.

pub mod breakpoint;
pub mod error;
pub mod heuristic;
pub mod replay;

pub use breakpoint::BreakpointSet;
pub use error::DebugError;
pub use heuristic::HEURISTIC_NOTICE;
pub use replay::{ContinueStop, DebugView, DebuggerState, ReplayDebugger, ReplayMode};
