//! In-worker evaluation of one request.
//!
//! Each run gets a fresh [`Interpreter`]: new globals, a new console and (when
//! instrumented) a new trace buffer, all dropped with the run. Nothing from
//! the host process is reachable from the script.

use std::time::Instant;

use runlab_core::language::unsupported_message;
use runlab_core::{Language, SandboxRequest, SandboxResponse};
use runlab_script::interpreter::LogSink;
use runlab_script::{Interpreter, InterpreterConfig};
use tracing::debug;

/// Interpreter settings for `request`.
pub fn interpreter_config(request: &SandboxRequest) -> InterpreterConfig {
    InterpreterConfig {
        trace_enabled: request.instrument,
        max_call_depth: request.limits.max_call_depth,
        max_log_entries: request.limits.max_log_entries,
        max_trace_events: request.limits.max_trace_events,
        max_array_length: request.limits.max_array_length,
        max_string_length: request.limits.max_string_length,
        random_seed: None,
    }
}

/// Evaluates `request`, forwarding each console entry to `sink` as it is
/// produced.
///
/// Must run on a thread with a [`runlab_script::SCRIPT_STACK_SIZE`] stack.
pub fn execute(request: &SandboxRequest, sink: LogSink) -> SandboxResponse {
    let started = Instant::now();
    if Language::normalize(&request.language).is_none() {
        return SandboxResponse {
            duration_ms: elapsed_ms(started),
            error: Some(unsupported_message(&request.language)),
            ..SandboxResponse::default()
        };
    }

    let outcome = Interpreter::new(interpreter_config(request))
        .with_log_sink(sink)
        .run_source(&request.code);
    let duration_ms = elapsed_ms(started);
    debug!(
        id = %request.id,
        duration_ms,
        logs = outcome.logs.len(),
        failed = outcome.error.is_some(),
        "script finished"
    );
    SandboxResponse {
        duration_ms,
        logs: outcome.logs,
        result: outcome.result,
        error: outcome.error,
        timeline: outcome.timeline,
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlab_core::{LogEntry, LogKind, RequestId, SandboxLimits};

    fn request(code: &str, instrument: bool) -> SandboxRequest {
        SandboxRequest {
            id: RequestId::from("t"),
            code: code.to_string(),
            language: "javascript".to_string(),
            instrument,
            limits: SandboxLimits::default(),
        }
    }

    fn run(request: SandboxRequest) -> SandboxResponse {
        runlab_script::with_script_stack(move || execute(&request, Box::new(|_: &LogEntry| {}))).unwrap()
    }

    #[test]
    fn captures_logs_and_duration() {
        let response = run(request("console.warn('w'); console.log(1 + 1)", false));
        assert!(response.duration_ms > 0.0);
        assert_eq!(response.logs.len(), 2);
        assert_eq!(response.logs[0].kind, LogKind::Warn);
        assert_eq!(response.logs[1].content, "2");
        assert!(response.result.is_none());
        assert!(response.timeline.is_none());
    }

    #[test]
    fn thrown_errors_keep_partial_logs() {
        let response = run(request("console.log('a');\nthrow new TypeError('bad')", false));
        assert_eq!(response.logs.len(), 1);
        assert_eq!(response.error.as_deref(), Some("TypeError: bad"));
    }

    #[test]
    fn hook_is_not_reachable_in_raw_runs() {
        let response = run(request("__runlab_trace(1, 'x')", false));
        assert_eq!(
            response.error.as_deref(),
            Some("ReferenceError: __runlab_trace is not defined")
        );
    }

    #[test]
    fn limits_are_applied() {
        let mut req = request("function f() { return f(); }\nf()", false);
        req.limits.max_call_depth = 16;
        let response = run(req);
        assert_eq!(
            response.error.as_deref(),
            Some("RangeError: Maximum call stack size exceeded")
        );
    }

    #[test]
    fn unsupported_language_is_refused() {
        let mut req = request("print(1)", false);
        req.language = "python".into();
        let response = run(req);
        assert!(response.error.unwrap().contains("Current language: python"));
    }
}
