//! Router assembly for the runlab HTTP API.
//!
//! [`build_router`] wires all handler functions to their routes with CORS
//! and tracing middleware layers.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the complete axum router.
///
/// Routes use axum 0.8 `/{param}` path syntax.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/execute", post(handlers::execute::execute))
        // Sessions
        .route("/sessions", post(handlers::sessions::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route("/sessions/{id}/run", post(handlers::sessions::run))
        .route(
            "/sessions/{id}/breakpoints",
            get(handlers::sessions::list_breakpoints),
        )
        .route(
            "/sessions/{id}/breakpoints/toggle",
            post(handlers::sessions::toggle_breakpoint),
        )
        // Replay debugger
        .route("/sessions/{id}/debug/start", post(handlers::debug::start))
        .route(
            "/sessions/{id}/debug/step-forward",
            post(handlers::debug::step_forward),
        )
        .route(
            "/sessions/{id}/debug/step-backward",
            post(handlers::debug::step_backward),
        )
        .route(
            "/sessions/{id}/debug/continue",
            post(handlers::debug::continue_to_breakpoint),
        )
        .route("/sessions/{id}/debug/select", post(handlers::debug::select))
        .route("/sessions/{id}/debug/stop", post(handlers::debug::stop))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
