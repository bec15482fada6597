//! Session lifecycle, runs and breakpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use runlab_core::{ExecutionRequest, ExecutionResult};
use uuid::Uuid;

use crate::error::ApiError;
use crate::schema::{
    BreakpointsResponse, CreateSessionResponse, RunRequest, SessionSummary,
    ToggleBreakpointRequest, ToggleBreakpointResponse,
};
use crate::session::Session;
use crate::state::AppState;

/// Looks up a session by its path segment.
pub(crate) fn find_session(state: &AppState, id: &str) -> Result<Arc<Session>, ApiError> {
    Uuid::parse_str(id)
        .ok()
        .and_then(|uuid| state.sessions.get(&uuid))
        .ok_or_else(|| ApiError::NotFound(format!("session {id}")))
}

/// `POST /sessions`
pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<CreateSessionResponse>) {
    let session = state.sessions.create((*state.config).clone());
    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id,
        }),
    )
}

/// `GET /sessions/{id}`
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let session = find_session(&state, &id)?;
    let busy = session.coordinator.is_busy();
    let workspace = session.workspace();
    let summary = SessionSummary {
        session_id: session.id,
        busy,
        language: workspace.language.clone(),
        source: workspace.source.clone(),
        last_result: workspace.last_result.clone(),
        breakpoints: workspace.breakpoints.lines().collect(),
        debug: workspace.debugger.view(),
    };
    Ok(Json(summary))
}

/// `DELETE /sessions/{id}`
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = find_session(&state, &id)?;
    state.sessions.remove(&session.id);
    tracing::info!(session = %session.id, "session deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Runs code in the session's sandbox and keeps the source and result for
/// debugging. Any active replay ends.
///
/// `POST /sessions/{id}/run`
pub async fn run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let Json(req) = payload?;
    let session = find_session(&state, &id)?;

    let request = ExecutionRequest::new(req.code.clone(), req.language.clone(), req.instrument);
    let result = session.coordinator.submit(request).await?;
    session
        .workspace()
        .record_run(req.language, req.code, result.clone());
    Ok(Json(result))
}

/// `POST /sessions/{id}/breakpoints/toggle`
pub async fn toggle_breakpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ToggleBreakpointRequest>, JsonRejection>,
) -> Result<Json<ToggleBreakpointResponse>, ApiError> {
    let Json(req) = payload?;
    let session = find_session(&state, &id)?;
    let mut workspace = session.workspace();
    let enabled = workspace.breakpoints.toggle(req.line);
    Ok(Json(ToggleBreakpointResponse {
        line: req.line,
        enabled,
        lines: workspace.breakpoints.lines().collect(),
    }))
}

/// `GET /sessions/{id}/breakpoints`
pub async fn list_breakpoints(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BreakpointsResponse>, ApiError> {
    let session = find_session(&state, &id)?;
    let lines = session.workspace().breakpoints.lines().collect();
    Ok(Json(BreakpointsResponse { lines }))
}
