//! Coordinator tests against the real `runlab-sandbox` worker binary.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use runlab_core::{ExecutionRequest, ExecutionStatus, LogKind, RequestId, TraceLabel};
use runlab_sandbox::{Coordinator, SandboxConfig, SubmitError};
use serde_json::json;
use tempfile::TempDir;

fn coordinator(timeout_ms: u64) -> Coordinator {
    let config = SandboxConfig::new(env!("CARGO_BIN_EXE_runlab-sandbox"))
        .with_timeout(Duration::from_millis(timeout_ms));
    Coordinator::new(config)
}

/// Writes a shell worker that swallows the request and prints `lines`.
fn scripted_worker(dir: &TempDir, lines: &[&str], exit_code: i32) -> PathBuf {
    let mut script = String::from("#!/bin/sh\nwhile read -r _; do :; done\n");
    for line in lines {
        script.push_str(&format!("echo '{line}'\n"));
    }
    script.push_str(&format!("exit {exit_code}\n"));
    let path = dir.path().join("worker.sh");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn request(id: &str, code: &str) -> ExecutionRequest {
    ExecutionRequest {
        id: RequestId::from(id),
        code: code.to_string(),
        language: "javascript".to_string(),
        instrument: false,
    }
}

fn contents(result: &runlab_core::ExecutionResult) -> Vec<&str> {
    result.logs.iter().map(|e| e.content.as_str()).collect()
}

const STRAY_LOG: &str =
    r#"{"type":"log","id":"other-run","entry":{"type":"log","content":"stray","timestamp":0}}"#;
const KEPT_LOG: &str =
    r#"{"type":"log","id":"run-1","entry":{"type":"log","content":"kept","timestamp":0}}"#;

fn process_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[tokio::test]
async fn console_log_round_trip() {
    let result = coordinator(3000)
        .submit(ExecutionRequest::new("console.log(1+1)", "javascript", false))
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(result.duration_ms > 0.0);
    assert_eq!(result.logs.len(), 1);
    assert_eq!(result.logs[0].kind, LogKind::Log);
    assert_eq!(result.logs[0].content, "2");
    assert!(result.result.is_none());
    assert!(result.error.is_none());
    assert!(result.timeline.is_none());
}

#[tokio::test]
async fn thrown_error_is_reported_without_result() {
    let result = coordinator(3000)
        .submit(ExecutionRequest::new("throw new Error('x')", "javascript", false))
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::RuntimeException);
    assert!(result.error.as_deref().unwrap().contains('x'));
    assert!(result.result.is_none());
}

#[tokio::test]
async fn instrumented_run_returns_timeline() {
    let result = coordinator(3000)
        .submit(ExecutionRequest::new("let a=1; a=2;", "javascript", true))
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    let timeline = result.timeline.expect("timeline");
    let lines: Vec<_> = timeline.line_events().collect();
    assert_eq!(lines.len(), 2);
    let a = lines[1]
        .data
        .variables
        .iter()
        .find(|v| v.name == "a")
        .expect("a in snapshot");
    assert_eq!(a.value, json!(2));
    assert_eq!(a.type_tag, "number");
}

#[tokio::test]
async fn repeated_pure_runs_are_identical() {
    let code = "const xs = [3, 1, 2].sort();\nfor (const x of xs) console.log(x * 2);\nxs.length";
    let coordinator = coordinator(3000);
    let first = coordinator
        .submit(ExecutionRequest::new(code, "javascript", true))
        .await
        .unwrap();
    let second = coordinator
        .submit(ExecutionRequest::new(code, "javascript", true))
        .await
        .unwrap();

    assert_eq!(first.logs, second.logs);
    assert_eq!(first.timeline, second.timeline);
    assert_eq!(first.result, Some(json!(3)));
    let timeline = first.timeline.expect("timeline");
    assert_eq!(
        timeline.events().last().map(|e| e.label),
        Some(TraceLabel::Result)
    );
}

#[tokio::test]
async fn infinite_loop_times_out_and_worker_is_killed() {
    let coordinator = coordinator(500);
    let started = Instant::now();
    let result = coordinator
        .submit(ExecutionRequest::new(
            "console.log('started');\nwhile (true) {}",
            "javascript",
            false,
        ))
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(result.error.as_deref(), Some("Execution timed out after 500 ms"));
    assert!(started.elapsed() < Duration::from_millis(500 + 2500));
    assert_eq!(result.logs.len(), 1);
    assert_eq!(result.logs[0].content, "started");
    assert!(result.timeline.is_none());

    let pid = coordinator.last_sandbox_pid().expect("worker was spawned");
    assert!(!process_alive(pid));
    assert!(!coordinator.is_busy());
}

#[tokio::test]
async fn timers_and_promises_settle_inside_budget() {
    let code = "setTimeout(() => console.log('late'), 20);\nawait delay(5);\nconsole.log('early');\n'done'";
    let result = coordinator(3000)
        .submit(ExecutionRequest::new(code, "javascript", false))
        .await
        .unwrap();

    let contents: Vec<_> = result.logs.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["early", "late"]);
    assert_eq!(result.result, Some(json!("done")));
}

#[tokio::test]
async fn concurrent_submission_is_refused() {
    let coordinator = coordinator(3000);
    let slow = coordinator.clone();
    let running = tokio::spawn(async move {
        slow.submit(ExecutionRequest::new("await delay(300);\n1", "javascript", false))
            .await
    });

    let deadline = Instant::now() + Duration::from_secs(2);
    while !coordinator.is_busy() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let refused = coordinator
        .submit(ExecutionRequest::new("2", "javascript", false))
        .await;
    assert!(matches!(refused, Err(SubmitError::Busy { .. })));

    let first = running.await.unwrap().unwrap();
    assert_eq!(first.result, Some(json!(1)));
    assert!(!coordinator.is_busy());
}

#[tokio::test]
async fn unsupported_language_warns() {
    let result = coordinator(3000)
        .submit(ExecutionRequest::new("print(1)", "Python 3", false))
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::UnsupportedLanguage);
    assert_eq!(result.logs[0].kind, LogKind::Warn);
    assert_eq!(
        result.logs[0].content,
        "Live execution only supports javascript, jsx. Current language: Python 3"
    );
}

#[tokio::test]
async fn oversized_array_is_a_runtime_exception_not_a_crash() {
    let result = coordinator(3000)
        .submit(ExecutionRequest::new(
            "console.log('before'); let a = []; a.length = 4294967295; 1",
            "javascript",
            false,
        ))
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::RuntimeException);
    assert_eq!(result.error.as_deref(), Some("RangeError: Invalid array length"));
    assert_eq!(contents(&result), vec!["before"]);
}

#[tokio::test]
async fn malformed_line_settles_once_as_transport_error() {
    let dir = tempfile::tempdir().unwrap();
    let worker = scripted_worker(
        &dir,
        &[
            STRAY_LOG,
            KEPT_LOG,
            "not json",
            r#"{"type":"settled","id":"run-1","response":{"durationMs":1,"logs":[],"result":5}}"#,
        ],
        0,
    );
    let coordinator = Coordinator::new(SandboxConfig::new(worker));

    let result = coordinator.submit(request("run-1", "5")).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::TransportError);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .starts_with("Sandbox transport error: malformed sandbox message"));
    assert_eq!(contents(&result), vec!["kept"]);
    assert!(result.result.is_none());
    assert!(result.timeline.is_none());
    assert!(!coordinator.is_busy());
}

#[tokio::test]
async fn worker_crash_mid_stream_keeps_partial_logs() {
    let dir = tempfile::tempdir().unwrap();
    let worker = scripted_worker(&dir, &[STRAY_LOG, KEPT_LOG], 3);
    let coordinator = Coordinator::new(SandboxConfig::new(worker));

    let result = coordinator.submit(request("run-1", "1")).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::TransportError);
    assert_eq!(
        result.error.as_deref(),
        Some("Sandbox transport error: sandbox exited without a result")
    );
    assert_eq!(contents(&result), vec!["kept"]);
}

#[tokio::test]
async fn settlement_for_another_request_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let worker = scripted_worker(
        &dir,
        &[
            r#"{"type":"settled","id":"other-run","response":{"durationMs":1,"logs":[],"result":99}}"#,
            KEPT_LOG,
            r#"{"type":"settled","id":"run-1","response":{"durationMs":1,"logs":[{"type":"log","content":"kept","timestamp":0}],"result":5}}"#,
        ],
        0,
    );
    let coordinator = Coordinator::new(SandboxConfig::new(worker));

    let result = coordinator.submit(request("run-1", "5")).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.result, Some(json!(5)));
    assert_eq!(contents(&result), vec!["kept"]);
}
