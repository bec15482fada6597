//! HTTP handler functions, grouped by resource.

pub mod debug;
pub mod execute;
pub mod health;
pub mod sessions;
