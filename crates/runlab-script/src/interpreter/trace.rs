//! Timeline recording for instrumented runs.
//!
//! When tracing is enabled via [`InterpreterConfig::trace_enabled`], every
//! call to the trace hook appends a `line` event and every console call a
//! `log` event. Recording stops silently at the configured cap; the final
//! `result`/`error` event is always appended so the timeline says how the run
//! ended.
//!
//! [`InterpreterConfig::trace_enabled`]: super::InterpreterConfig::trace_enabled

use runlab_core::{LogKind, TraceEvent, Variable};

#[derive(Debug, Default)]
pub struct TraceRecorder {
    events: Vec<TraceEvent>,
    limit: usize,
}

impl TraceRecorder {
    pub fn new(limit: usize) -> Self {
        TraceRecorder {
            events: Vec::new(),
            limit,
        }
    }

    fn next_timestamp(&self) -> u64 {
        self.events.len() as u64
    }

    fn has_room(&self) -> bool {
        self.events.len() < self.limit
    }

    pub fn record_line(
        &mut self,
        line: u32,
        variables: Vec<Variable>,
        code_snippet: Option<String>,
        call_stack: Vec<String>,
    ) {
        if self.has_room() {
            let event = TraceEvent::line(self.next_timestamp(), line, variables, code_snippet, call_stack);
            self.events.push(event);
        }
    }

    pub fn record_log(&mut self, kind: LogKind, content: &str) {
        if self.has_room() {
            let event = TraceEvent::log(self.next_timestamp(), kind, content);
            self.events.push(event);
        }
    }

    pub fn record_result(&mut self, value: serde_json::Value) {
        let event = TraceEvent::result(self.next_timestamp(), value);
        self.events.push(event);
    }

    pub fn record_error(&mut self, message: &str) {
        let event = TraceEvent::error(self.next_timestamp(), message);
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlab_core::TraceLabel;
    use serde_json::json;

    #[test]
    fn timestamps_follow_insertion_order() {
        let mut trace = TraceRecorder::new(10);
        trace.record_line(1, vec![], None, vec!["<global>".into()]);
        trace.record_log(LogKind::Log, "2");
        trace.record_result(json!(2));
        let events = trace.into_events();
        let stamps: Vec<u64> = events.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![0, 1, 2]);
        assert_eq!(events[2].label, TraceLabel::Result);
    }

    #[test]
    fn cap_drops_checkpoints_but_keeps_the_ending() {
        let mut trace = TraceRecorder::new(2);
        for line in 1..=5 {
            trace.record_line(line, vec![], None, vec![]);
        }
        trace.record_error("Error: late");
        let events = trace.into_events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].label, TraceLabel::Error);
        assert_eq!(events[2].timestamp, 2);
    }
}
