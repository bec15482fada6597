//! Request and response bodies of the HTTP API.

use runlab_core::ExecutionResult;
use runlab_debug::DebugView;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /execute`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    /// Caller-chosen request id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub instrument: bool,
}

/// Body of `POST /sessions/{id}/run`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub instrument: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleBreakpointRequest {
    pub line: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectRequest {
    pub index: usize,
}

/// Body of `POST /sessions/{id}/debug/start`; optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartDebugRequest {
    /// Ignore any timeline and reconstruct states from the source.
    #[serde(default)]
    pub heuristic: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointsResponse {
    pub lines: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleBreakpointResponse {
    pub line: u32,
    /// Whether the line is set after the toggle.
    pub enabled: bool,
    pub lines: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<ExecutionResult>,
    pub breakpoints: Vec<u32>,
    pub debug: DebugView,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
