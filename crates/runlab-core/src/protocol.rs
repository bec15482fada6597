//! Coordinator <-> sandbox wire protocol.
//!
//! The coordinator writes one [`SandboxRequest`] as JSON to the worker's
//! stdin and closes it. The worker answers with newline-delimited
//! [`WorkerMessage`]s on stdout: any number of streamed `log` messages, then
//! exactly one `settled` message.

use serde::{Deserialize, Serialize};

use crate::id::RequestId;
use crate::model::{LogEntry, TraceEvent};

/// Resource limits applied inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxLimits {
    pub max_log_entries: usize,
    pub max_trace_events: usize,
    pub max_call_depth: usize,
    /// Longest array a script may build; longer ones are a `RangeError`.
    pub max_array_length: usize,
    /// Longest string a script may build, in bytes.
    pub max_string_length: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        SandboxLimits {
            max_log_entries: 1000,
            max_trace_events: 10_000,
            max_call_depth: 256,
            max_array_length: 10_000_000,
            max_string_length: 100_000_000,
        }
    }
}

/// Work order handed to a sandbox process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxRequest {
    pub id: RequestId,
    /// Source to evaluate (already instrumented when `instrument` is set).
    pub code: String,
    pub language: String,
    pub instrument: bool,
    #[serde(default)]
    pub limits: SandboxLimits,
}

/// Terminal answer of a sandbox. At most one of `result`/`error` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxResponse {
    pub duration_ms: f64,
    pub logs: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<TraceEvent>>,
}

/// One line written by the worker to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// A console entry, streamed as soon as the script produces it.
    Log { id: RequestId, entry: LogEntry },
    /// The run finished (successfully or with a thrown error).
    Settled {
        id: RequestId,
        response: SandboxResponse,
    },
}

impl WorkerMessage {
    pub fn id(&self) -> &RequestId {
        match self {
            WorkerMessage::Log { id, .. } | WorkerMessage::Settled { id, .. } => id,
        }
    }

    /// Encodes the message as a single JSON line (with trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogKind;
    use serde_json::json;

    #[test]
    fn settled_message_uses_camel_case_fields() {
        let msg = WorkerMessage::Settled {
            id: RequestId::from("r1"),
            response: SandboxResponse {
                duration_ms: 1.5,
                logs: vec![],
                result: Some(json!(2)),
                error: None,
                timeline: None,
            },
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "settled");
        assert_eq!(value["response"]["durationMs"], json!(1.5));
        assert!(value["response"].get("error").is_none());
    }

    #[test]
    fn log_line_parses_back() {
        let msg = WorkerMessage::Log {
            id: RequestId::from("r2"),
            entry: LogEntry::new(LogKind::Info, "ready", 0),
        };
        let line = msg.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let parsed = WorkerMessage::from_line(&line).unwrap();
        assert_eq!(parsed.id().as_str(), "r2");
    }

    #[test]
    fn request_limits_default_when_absent() {
        let req: SandboxRequest = serde_json::from_value(json!({
            "id": "r3", "code": "1", "language": "javascript", "instrument": false
        }))
        .unwrap();
        assert_eq!(req.limits, SandboxLimits::default());
    }
}
