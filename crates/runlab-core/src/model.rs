//! Execution data model: requests, console entries, trace events, timelines
//! and debugger states.
//!
//! Field names serialize in camelCase because the same shapes travel to the
//! browser UI and over the sandbox wire protocol.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::RequestId;

/// One run submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub id: RequestId,
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub instrument: bool,
}

impl ExecutionRequest {
    /// Creates a request with a generated id.
    pub fn new(code: impl Into<String>, language: impl Into<String>, instrument: bool) -> Self {
        ExecutionRequest {
            id: RequestId::generate(),
            code: code.into(),
            language: language.into(),
            instrument,
        }
    }
}

/// Console channel of a captured entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Log,
    Error,
    Warn,
    Info,
    /// Final value of a run, as rendered by hosts that show it inline.
    Result,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Log => "log",
            LogKind::Error => "error",
            LogKind::Warn => "warn",
            LogKind::Info => "info",
            LogKind::Result => "result",
        }
    }
}

/// One captured console call.
///
/// `timestamp` is the zero-based sequence number within the run, not a
/// wall-clock reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub content: String,
    pub timestamp: u64,
}

impl LogEntry {
    pub fn new(kind: LogKind, content: impl Into<String>, timestamp: u64) -> Self {
        LogEntry {
            kind,
            content: content.into(),
            timestamp,
        }
    }
}

/// A named value observed at a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: serde_json::Value,
    /// Runtime type tag (`number`, `string`, `array`, ...).
    #[serde(rename = "type")]
    pub type_tag: String,
}

impl Variable {
    pub fn new(
        name: impl Into<String>,
        value: serde_json::Value,
        type_tag: impl Into<String>,
    ) -> Self {
        Variable {
            name: name.into(),
            value,
            type_tag: type_tag.into(),
        }
    }
}

/// Kind of a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLabel {
    Line,
    Log,
    Result,
    Error,
}

/// Payload of a trace event. Which fields are set depends on the label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_stack: Vec<String>,
    /// Console content (`log`) or error message (`error`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Console channel for `log` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<LogKind>,
    /// Final value for `result` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// One instrumented checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Position within the timeline (strictly increasing).
    pub timestamp: u64,
    pub label: TraceLabel,
    pub data: TraceData,
}

impl TraceEvent {
    pub fn line(
        timestamp: u64,
        line: u32,
        variables: Vec<Variable>,
        code_snippet: Option<String>,
        call_stack: Vec<String>,
    ) -> Self {
        TraceEvent {
            timestamp,
            label: TraceLabel::Line,
            data: TraceData {
                line: Some(line),
                variables,
                code_snippet,
                call_stack,
                ..TraceData::default()
            },
        }
    }

    pub fn log(timestamp: u64, kind: LogKind, content: impl Into<String>) -> Self {
        TraceEvent {
            timestamp,
            label: TraceLabel::Log,
            data: TraceData {
                message: Some(content.into()),
                kind: Some(kind),
                ..TraceData::default()
            },
        }
    }

    pub fn result(timestamp: u64, value: serde_json::Value) -> Self {
        TraceEvent {
            timestamp,
            label: TraceLabel::Result,
            data: TraceData {
                value: Some(value),
                ..TraceData::default()
            },
        }
    }

    pub fn error(timestamp: u64, message: impl Into<String>) -> Self {
        TraceEvent {
            timestamp,
            label: TraceLabel::Error,
            data: TraceData {
                message: Some(message.into()),
                ..TraceData::default()
            },
        }
    }

    /// Converts a `line` event into a debugger state. Other labels yield `None`.
    pub fn to_debug_state(&self) -> Option<DebugState> {
        if self.label != TraceLabel::Line {
            return None;
        }
        Some(DebugState {
            line: self.data.line?,
            variables: self.data.variables.clone(),
            call_stack: self.data.call_stack.clone(),
            code_snippet: self.data.code_snippet.clone(),
        })
    }
}

/// Ordered, immutable record of the checkpoints of one instrumented run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline(Vec<TraceEvent>);

impl Timeline {
    /// Builds a timeline, checking that timestamps strictly increase.
    pub fn new(events: Vec<TraceEvent>) -> Result<Self, CoreError> {
        for (index, pair) in events.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(CoreError::NonMonotonicTimeline {
                    index: index + 1,
                    previous: pair[0].timestamp,
                    found: pair[1].timestamp,
                });
            }
        }
        Ok(Timeline(events))
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the `line`-labeled events in order.
    pub fn line_events(&self) -> impl Iterator<Item = &TraceEvent> {
        self.0.iter().filter(|e| e.label == TraceLabel::Line)
    }

    pub fn has_line_events(&self) -> bool {
        self.line_events().next().is_some()
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.0
    }
}

/// One step of a replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugState {
    pub line: u32,
    pub variables: Vec<Variable>,
    pub call_stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line_event(ts: u64, line: u32) -> TraceEvent {
        TraceEvent::line(ts, line, vec![], None, vec!["<global>".into()])
    }

    #[test]
    fn timeline_accepts_increasing_timestamps() {
        let timeline = Timeline::new(vec![line_event(0, 1), line_event(1, 2), line_event(5, 3)])
            .unwrap();
        assert_eq!(timeline.len(), 3);
    }

    #[test]
    fn timeline_rejects_repeated_timestamp() {
        let err = Timeline::new(vec![line_event(0, 1), line_event(0, 2)]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("event 1"), "unexpected message: {}", msg);
    }

    #[test]
    fn line_events_skip_other_labels() {
        let timeline = Timeline::new(vec![
            line_event(0, 1),
            TraceEvent::log(1, LogKind::Log, "hi"),
            line_event(2, 2),
            TraceEvent::result(3, json!(4)),
        ])
        .unwrap();
        let lines: Vec<u32> = timeline
            .line_events()
            .filter_map(|e| e.data.line)
            .collect();
        assert_eq!(lines, vec![1, 2]);
    }

    #[test]
    fn only_line_events_become_debug_states() {
        let event = TraceEvent::line(
            0,
            3,
            vec![Variable::new("a", json!(2), "number")],
            Some("a = 2;".into()),
            vec!["<global>".into()],
        );
        let state = event.to_debug_state().unwrap();
        assert_eq!(state.line, 3);
        assert_eq!(state.variables[0].value, json!(2));
        assert!(TraceEvent::error(1, "boom").to_debug_state().is_none());
    }

    #[test]
    fn log_entry_uses_type_field() {
        let entry = LogEntry::new(LogKind::Warn, "careful", 0);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value, json!({ "type": "warn", "content": "careful", "timestamp": 0 }));
    }

    #[test]
    fn trace_data_serializes_camel_case_and_skips_empty() {
        let event = TraceEvent::line(0, 1, vec![], Some("x;".into()), vec!["<global>".into()]);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "timestamp": 0,
                "label": "line",
                "data": { "line": 1, "codeSnippet": "x;", "callStack": ["<global>"] }
            })
        );
    }

    #[test]
    fn request_instrument_defaults_to_false() {
        let req: ExecutionRequest =
            serde_json::from_value(json!({ "id": "a", "code": "1", "language": "js" })).unwrap();
        assert!(!req.instrument);
    }
}
