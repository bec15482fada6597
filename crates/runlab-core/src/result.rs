//! Terminal outcome of a run.
//!
//! Every request produces exactly one [`ExecutionResult`], whichever path
//! settled it. [`ExecutionStatus`] tells the host which of the failure kinds
//! occurred so it can label the entry distinctly.

use serde::{Deserialize, Serialize};

use crate::id::RequestId;
use crate::language::unsupported_message;
use crate::model::{LogEntry, LogKind, Timeline};
use crate::protocol::SandboxResponse;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    /// Language not in the allow-list. Warning level; nothing was spawned.
    UnsupportedLanguage,
    /// Source could not be instrumented. Nothing was spawned.
    InstrumentationFailure,
    /// The script threw.
    RuntimeException,
    /// The sandbox did not settle within the budget and was killed.
    Timeout,
    /// The sandbox crashed or could not be talked to.
    TransportError,
}

impl ExecutionStatus {
    /// Whether the outcome should be rendered as an error (vs. a warning or success).
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::UnsupportedLanguage
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::UnsupportedLanguage => "unsupported language",
            ExecutionStatus::InstrumentationFailure => "instrumentation failure",
            ExecutionStatus::RuntimeException => "runtime exception",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::TransportError => "transport error",
        }
    }
}

/// Terminal outcome of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub id: RequestId,
    pub status: ExecutionStatus,
    /// Milliseconds from dispatch to settlement.
    pub duration_ms: f64,
    pub logs: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Timeline>,
}

impl ExecutionResult {
    /// Warning-level refusal for a language outside the allow-list.
    pub fn unsupported_language(id: RequestId, language: &str) -> Self {
        ExecutionResult {
            id,
            status: ExecutionStatus::UnsupportedLanguage,
            duration_ms: 0.0,
            logs: vec![LogEntry::new(
                LogKind::Warn,
                unsupported_message(language),
                0,
            )],
            result: None,
            error: None,
            timeline: None,
        }
    }

    pub fn instrumentation_failure(id: RequestId, message: &str, duration_ms: f64) -> Self {
        ExecutionResult {
            id,
            status: ExecutionStatus::InstrumentationFailure,
            duration_ms,
            logs: Vec::new(),
            result: None,
            error: Some(format!("Instrumentation failed: {}", message)),
            timeline: None,
        }
    }

    /// Timeout outcome. `partial_logs` are the entries streamed before the
    /// sandbox was killed; the timeline is never delivered.
    pub fn timeout(
        id: RequestId,
        budget_ms: u64,
        partial_logs: Vec<LogEntry>,
        duration_ms: f64,
    ) -> Self {
        ExecutionResult {
            id,
            status: ExecutionStatus::Timeout,
            duration_ms,
            logs: partial_logs,
            result: None,
            error: Some(format!("Execution timed out after {} ms", budget_ms)),
            timeline: None,
        }
    }

    pub fn transport_error(
        id: RequestId,
        message: &str,
        partial_logs: Vec<LogEntry>,
        duration_ms: f64,
    ) -> Self {
        ExecutionResult {
            id,
            status: ExecutionStatus::TransportError,
            duration_ms,
            logs: partial_logs,
            result: None,
            error: Some(format!("Sandbox transport error: {}", message)),
            timeline: None,
        }
    }

    /// Folds a sandbox response into a result.
    ///
    /// An error wins over a result; a timeline without any `line` event (or
    /// with out-of-order timestamps) is dropped.
    pub fn from_response(
        id: RequestId,
        response: SandboxResponse,
        instrumented: bool,
        duration_ms: f64,
    ) -> Self {
        let (status, result) = match &response.error {
            Some(_) => (ExecutionStatus::RuntimeException, None),
            None => (ExecutionStatus::Success, response.result),
        };
        let timeline = if instrumented {
            response
                .timeline
                .and_then(|events| Timeline::new(events).ok())
                .filter(Timeline::has_line_events)
        } else {
            None
        };
        ExecutionResult {
            id,
            status,
            duration_ms,
            logs: response.logs,
            result,
            error: response.error,
            timeline,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TraceEvent;
    use serde_json::json;

    #[test]
    fn unsupported_language_is_a_warning_without_error() {
        let result = ExecutionResult::unsupported_language(RequestId::from("a"), "python");
        assert_eq!(result.status, ExecutionStatus::UnsupportedLanguage);
        assert!(!result.status.is_error());
        assert!(result.error.is_none());
        assert_eq!(result.logs[0].kind, LogKind::Warn);
        assert!(result.logs[0].content.ends_with("Current language: python"));
    }

    #[test]
    fn response_error_wins_over_result() {
        let response = SandboxResponse {
            duration_ms: 1.0,
            logs: vec![],
            result: Some(json!(1)),
            error: Some("Error: x".into()),
            timeline: None,
        };
        let result = ExecutionResult::from_response(RequestId::from("b"), response, false, 2.0);
        assert_eq!(result.status, ExecutionStatus::RuntimeException);
        assert!(result.result.is_none());
        assert_eq!(result.error.as_deref(), Some("Error: x"));
    }

    #[test]
    fn timeline_without_line_events_is_dropped() {
        let response = SandboxResponse {
            duration_ms: 1.0,
            logs: vec![],
            result: None,
            error: Some("Error: early".into()),
            timeline: Some(vec![TraceEvent::error(0, "Error: early")]),
        };
        let result = ExecutionResult::from_response(RequestId::from("c"), response, true, 1.0);
        assert!(result.timeline.is_none());
    }

    #[test]
    fn timeline_ignored_for_raw_runs() {
        let response = SandboxResponse {
            duration_ms: 1.0,
            logs: vec![],
            result: None,
            error: None,
            timeline: Some(vec![TraceEvent::line(0, 1, vec![], None, vec![])]),
        };
        let result = ExecutionResult::from_response(RequestId::from("d"), response, false, 1.0);
        assert!(result.timeline.is_none());
    }

    #[test]
    fn status_serializes_snake_case() {
        let result = ExecutionResult::timeout(RequestId::from("e"), 3000, vec![], 3001.0);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "timeout");
        assert_eq!(value["error"], "Execution timed out after 3000 ms");
        assert_eq!(value["durationMs"], json!(3001.0));
    }
}
