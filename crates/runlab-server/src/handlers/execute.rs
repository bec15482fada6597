//! Stateless execution endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use runlab_core::{ExecutionRequest, ExecutionResult, RequestId};

use crate::error::ApiError;
use crate::schema::ExecuteRequest;
use crate::state::AppState;

/// Header naming the caller for the rate-limit pre-check.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Runs code in a fresh sandbox.
///
/// `POST /execute`
pub async fn execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let Json(req) = payload?;

    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous");
    let decision = state.rate_limiter.check(user_id);
    if !decision.allowed {
        tracing::info!(user = user_id, "execution refused by rate limiter");
        return Err(ApiError::RateLimited(decision));
    }

    let request = ExecutionRequest {
        id: req.id.map(RequestId::from).unwrap_or_else(RequestId::generate),
        code: req.code,
        language: req.language,
        instrument: req.instrument,
    };
    let result = state.coordinator.submit(request).await?;
    Ok(Json(result))
}
