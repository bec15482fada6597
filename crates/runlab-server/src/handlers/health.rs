//! Liveness endpoint.

use axum::Json;

use crate::schema::HealthResponse;

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
