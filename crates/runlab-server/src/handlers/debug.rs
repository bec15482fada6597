//! Replay debugger endpoints. Every handler answers with the resulting
//! [`DebugView`].

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use runlab_debug::DebugView;

use crate::error::ApiError;
use crate::handlers::sessions::find_session;
use crate::schema::{SelectRequest, StartDebugRequest};
use crate::session::Workspace;
use crate::state::AppState;

/// Applies `action` to the session's workspace and returns the debugger view.
fn with_workspace(
    state: &AppState,
    id: &str,
    action: impl FnOnce(&mut Workspace) -> Result<(), ApiError>,
) -> Result<Json<DebugView>, ApiError> {
    let session = find_session(state, id)?;
    let mut workspace = session.workspace();
    action(&mut workspace)?;
    let view = workspace.debugger.view();
    Ok(Json(view))
}

/// Starts replaying the session's last run. Falls back to heuristic mode
/// when the run has no timeline, or when `?heuristic=true` is given.
///
/// `POST /sessions/{id}/debug/start`
pub async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<StartDebugRequest>,
) -> Result<Json<DebugView>, ApiError> {
    with_workspace(&state, &id, |workspace| {
        let Some(source) = workspace.source.as_deref() else {
            return Err(ApiError::BadRequest(
                "run code in this session before debugging".to_string(),
            ));
        };
        let timeline = workspace
            .last_result
            .as_ref()
            .and_then(|result| result.timeline.as_ref())
            .filter(|_| !params.heuristic);
        workspace.debugger.start(timeline, source)?;
        Ok(())
    })
}

/// `POST /sessions/{id}/debug/step-forward`
pub async fn step_forward(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DebugView>, ApiError> {
    with_workspace(&state, &id, |workspace| {
        workspace.debugger.step_forward()?;
        Ok(())
    })
}

/// `POST /sessions/{id}/debug/step-backward`
pub async fn step_backward(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DebugView>, ApiError> {
    with_workspace(&state, &id, |workspace| {
        workspace.debugger.step_backward()?;
        Ok(())
    })
}

/// `POST /sessions/{id}/debug/continue`
pub async fn continue_to_breakpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DebugView>, ApiError> {
    with_workspace(&state, &id, |workspace| {
        let stop = workspace
            .debugger
            .continue_to_breakpoint(&workspace.breakpoints)?;
        tracing::debug!(?stop, "continue finished");
        Ok(())
    })
}

/// `POST /sessions/{id}/debug/select`
pub async fn select(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<SelectRequest>, JsonRejection>,
) -> Result<Json<DebugView>, ApiError> {
    let Json(req) = payload?;
    with_workspace(&state, &id, |workspace| {
        workspace.debugger.select(req.index)?;
        Ok(())
    })
}

/// `POST /sessions/{id}/debug/stop`
pub async fn stop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DebugView>, ApiError> {
    with_workspace(&state, &id, |workspace| {
        workspace.debugger.stop();
        Ok(())
    })
}
