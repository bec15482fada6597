//! HTTP/JSON API for the runlab execution engine.
//!
//! Exposes a stateless execute endpoint guarded by the rate-limit pre-check,
//! and debug sessions that own their breakpoints, last run and replay
//! debugger. Runs go through [`runlab_sandbox::Coordinator`]; nothing from an
//! untrusted run executes in this process.

pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod router;
pub mod schema;
pub mod session;
pub mod state;
