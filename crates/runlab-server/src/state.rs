//! Application state shared by all handlers.

use std::sync::Arc;

use runlab_sandbox::{Coordinator, SandboxConfig};

use crate::rate_limit::{AllowAll, RateLimiter};
use crate::session::SessionStore;

/// Shared application state for the HTTP server.
///
/// Cloned into every handler; all fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SandboxConfig>,
    /// Host-wide single-flight handle used by `POST /execute`.
    pub coordinator: Coordinator,
    pub sessions: Arc<SessionStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    pub fn new(config: SandboxConfig) -> Self {
        AppState {
            coordinator: Coordinator::new(config.clone()),
            config: Arc::new(config),
            sessions: Arc::new(SessionStore::new()),
            rate_limiter: Arc::new(AllowAll),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: impl RateLimiter + 'static) -> Self {
        self.rate_limiter = Arc::new(limiter);
        self
    }
}
