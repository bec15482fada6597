//! End-to-end tests for the runlab HTTP API.
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`; no
//! network server is started. Most tests point the sandbox worker path at a
//! binary that does not exist, so JavaScript runs settle as transport errors
//! without executing anything; the runtime replay test uses a shell worker
//! that answers with a fixed timeline. Real worker runs are covered by the
//! sandbox crate's own integration tests.

use std::os::unix::fs::PermissionsExt;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::json;
use tower::ServiceExt;

use runlab_sandbox::SandboxConfig;
use runlab_server::rate_limit::{RateLimitDecision, RateLimiter};
use runlab_server::router::build_router;
use runlab_server::state::AppState;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const MISSING_WORKER: &str = "/nonexistent/runlab-sandbox";

fn test_state() -> AppState {
    AppState::new(SandboxConfig::new(MISSING_WORKER))
}

fn test_app() -> Router {
    build_router(test_state())
}

/// Settles every request with a three-line timeline, echoing the request id.
const TIMELINE_WORKER: &str = r##"#!/bin/sh
read -r request
id=${request#*\"id\":\"}
id=${id%%\"*}
printf '%s%s%s\n' '{"type":"settled","id":"' "$id" '","response":{"durationMs":1,"logs":[{"type":"log","content":"2","timestamp":0}],"timeline":[{"timestamp":0,"label":"line","data":{"line":1,"variables":[{"name":"a","value":1,"type":"number"}],"codeSnippet":"let a = 1;"}},{"timestamp":1,"label":"line","data":{"line":2,"variables":[{"name":"a","value":1,"type":"number"},{"name":"b","value":2,"type":"number"}],"codeSnippet":"let b = a + 1;"}},{"timestamp":2,"label":"log","data":{"message":"2","kind":"log"}},{"timestamp":3,"label":"line","data":{"line":3,"variables":[{"name":"a","value":1,"type":"number"},{"name":"b","value":2,"type":"number"}],"codeSnippet":"console.log(b);"}},{"timestamp":4,"label":"result","data":{}}]}}'
"##;

fn timeline_app(dir: &tempfile::TempDir) -> Router {
    let path = dir.path().join("worker.sh");
    std::fs::write(&path, TIMELINE_WORKER).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    build_router(AppState::new(SandboxConfig::new(path)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap_or(json!(null));
    (status, json)
}

/// Sends a POST request with a JSON body and returns (status, json).
async fn post_json(
    app: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, request).await
}

/// Sends a POST request without a body.
async fn post_empty(app: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

async fn get_json(app: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

async fn delete(app: &Router, path: &str) -> StatusCode {
    let request = Request::builder()
        .method("DELETE")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    send(app, request).await.0
}

async fn create_session(app: &Router) -> String {
    let (status, body) = post_empty(app, "/sessions").await;
    assert_eq!(status, StatusCode::CREATED);
    body["sessionId"].as_str().unwrap().to_string()
}

struct DenyAll;

impl RateLimiter for DenyAll {
    fn check(&self, _user_id: &str) -> RateLimitDecision {
        RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at: 1_700_000_060_000,
            retry_after: Some(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Execute
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app();
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unsupported_language_settles_with_warning() {
    let app = test_app();
    let (status, body) = post_json(
        &app,
        "/execute",
        json!({"id": "req-1", "code": "print(1)", "language": "Python 3"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "req-1");
    assert_eq!(body["status"], "unsupported_language");
    assert_eq!(body["logs"][0]["type"], "warn");
    assert_eq!(
        body["logs"][0]["content"],
        "Live execution only supports javascript, jsx. Current language: Python 3"
    );
}

#[tokio::test]
async fn missing_worker_settles_as_transport_error() {
    let app = test_app();
    let (status, body) = post_json(
        &app,
        "/execute",
        json!({"code": "console.log(1)", "language": "javascript"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "transport_error");
    assert!(body["error"].is_string());
    assert!(body.get("timeline").is_none());
}

#[tokio::test]
async fn instrumentation_failure_reports_error() {
    let app = test_app();
    let (status, body) = post_json(
        &app,
        "/execute",
        json!({"code": "let = ;", "language": "javascript", "instrument": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "instrumentation_failure");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Instrumentation failed:"));
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = test_app();
    let (status, body) = post_json(&app, "/execute", json!({"language": "javascript"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn rate_limited_caller_gets_429() {
    let app = build_router(test_state().with_rate_limiter(DenyAll));
    let request = Request::builder()
        .method("POST")
        .uri("/execute")
        .header("content-type", "application/json")
        .header("x-user-id", "user-7")
        .body(Body::from(
            serde_json::to_vec(&json!({"code": "1", "language": "javascript"})).unwrap(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "60");

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    assert_eq!(body["error"]["details"]["remaining"], 0);
    assert_eq!(body["error"]["details"]["retryAfter"], 60);
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_lifecycle() {
    let app = test_app();
    let id = create_session(&app).await;

    let (status, body) = get_json(&app, &format!("/sessions/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionId"], id.as_str());
    assert_eq!(body["busy"], false);
    assert_eq!(body["debug"]["active"], false);
    assert!(body.get("source").is_none());

    assert_eq!(delete(&app, &format!("/sessions/{id}")).await, StatusCode::NO_CONTENT);
    let (status, body) = get_json(&app, &format!("/sessions/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn unknown_or_invalid_session_is_not_found() {
    let app = test_app();
    let (status, _) = get_json(&app, "/sessions/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get_json(&app, &format!("/sessions/{}", uuid::Uuid::nil())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn breakpoints_toggle_on_and_off() {
    let app = test_app();
    let id = create_session(&app).await;
    let path = format!("/sessions/{id}/breakpoints/toggle");

    let (status, body) = post_json(&app, &path, json!({"line": 5})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);
    post_json(&app, &path, json!({"line": 2})).await;

    let (_, body) = get_json(&app, &format!("/sessions/{id}/breakpoints")).await;
    assert_eq!(body["lines"], json!([2, 5]));

    let (_, body) = post_json(&app, &path, json!({"line": 5})).await;
    assert_eq!(body["enabled"], false);
    assert_eq!(body["lines"], json!([2]));
}

// ---------------------------------------------------------------------------
// Replay debugger
// ---------------------------------------------------------------------------

#[tokio::test]
async fn debugging_requires_a_run() {
    let app = test_app();
    let id = create_session(&app).await;
    let (status, body) = post_empty(&app, &format!("/sessions/{id}/debug/start")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn stepping_while_idle_is_conflict() {
    let app = test_app();
    let id = create_session(&app).await;
    let (status, body) = post_empty(&app, &format!("/sessions/{id}/debug/step-forward")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn heuristic_replay_after_failed_run() {
    let app = test_app();
    let id = create_session(&app).await;
    let code = "let a = 1;\n\nlet b = a + 1;\nconsole.log(b);";

    // No worker: the run settles as a transport error without a timeline,
    // but the source is kept for debugging.
    let (status, body) = post_json(
        &app,
        &format!("/sessions/{id}/run"),
        json!({"code": code, "language": "javascript", "instrument": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "transport_error");

    post_json(
        &app,
        &format!("/sessions/{id}/breakpoints/toggle"),
        json!({"line": 4}),
    )
    .await;

    let (status, view) = post_empty(&app, &format!("/sessions/{id}/debug/start")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["active"], true);
    assert_eq!(view["mode"], "heuristic");
    assert_eq!(view["total"], 3);
    assert_eq!(view["index"], 0);
    assert_eq!(view["state"]["line"], 1);
    assert!(view["notice"].is_string());

    let (_, view) = post_empty(&app, &format!("/sessions/{id}/debug/step-backward")).await;
    assert_eq!(view["index"], 0);

    let (_, view) = post_empty(&app, &format!("/sessions/{id}/debug/continue")).await;
    assert_eq!(view["index"], 2);
    assert_eq!(view["state"]["line"], 4);

    let (_, view) = post_json(&app, &format!("/sessions/{id}/debug/select"), json!({"index": 1})).await;
    assert_eq!(view["state"]["line"], 3);

    let (status, _) =
        post_json(&app, &format!("/sessions/{id}/debug/select"), json!({"index": 9})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, view) = post_empty(&app, &format!("/sessions/{id}/debug/stop")).await;
    assert_eq!(view["active"], false);
    assert_eq!(view["total"], 0);
}

#[tokio::test]
async fn new_run_ends_active_replay() {
    let app = test_app();
    let id = create_session(&app).await;
    let run = json!({"code": "let x = 2;", "language": "javascript"});

    post_json(&app, &format!("/sessions/{id}/run"), run.clone()).await;
    let (_, view) = post_empty(&app, &format!("/sessions/{id}/debug/start?heuristic=true")).await;
    assert_eq!(view["active"], true);

    post_json(&app, &format!("/sessions/{id}/run"), run).await;
    let (_, summary) = get_json(&app, &format!("/sessions/{id}")).await;
    assert_eq!(summary["debug"]["active"], false);
    assert_eq!(summary["source"], "let x = 2;");
    assert_eq!(summary["language"], "javascript");
}

#[tokio::test]
async fn runtime_replay_follows_the_recorded_timeline() {
    let dir = tempfile::tempdir().unwrap();
    let app = timeline_app(&dir);
    let id = create_session(&app).await;
    let code = "let a = 1;\nlet b = a + 1;\nconsole.log(b);";

    let (status, body) = post_json(
        &app,
        &format!("/sessions/{id}/run"),
        json!({"code": code, "language": "javascript", "instrument": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["timeline"].as_array().map(Vec::len), Some(5));

    post_json(
        &app,
        &format!("/sessions/{id}/breakpoints/toggle"),
        json!({"line": 3}),
    )
    .await;

    let (status, view) = post_empty(&app, &format!("/sessions/{id}/debug/start")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["mode"], "runtime");
    assert_eq!(view["total"], 3);
    assert_eq!(view["index"], 0);
    assert_eq!(view["state"]["line"], 1);
    assert!(view.get("notice").is_none());

    let (_, view) = post_empty(&app, &format!("/sessions/{id}/debug/continue")).await;
    assert_eq!(view["mode"], "runtime");
    assert_eq!(view["index"], 2);
    assert_eq!(view["state"]["line"], 3);
    assert_eq!(view["state"]["codeSnippet"], "console.log(b);");
    assert_eq!(
        view["state"]["variables"][1],
        json!({"name": "b", "value": 2, "type": "number"})
    );
    assert!(view.get("notice").is_none());

    let (_, view) = post_empty(&app, &format!("/sessions/{id}/debug/step-backward")).await;
    assert_eq!(view["index"], 1);
    assert_eq!(view["state"]["line"], 2);
}
