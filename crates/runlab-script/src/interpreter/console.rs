//! Captured console.
//!
//! A fresh [`Console`] is created for every run. Entries never reach the
//! process's real stdout; they are collected in call order and optionally
//! forwarded to a sink as they happen (the sandbox worker streams them to the
//! coordinator this way).

use runlab_core::{LogEntry, LogKind};

/// Callback receiving each entry as soon as it is captured.
pub type LogSink = Box<dyn FnMut(&LogEntry)>;

pub struct Console {
    entries: Vec<LogEntry>,
    limit: usize,
    truncated: bool,
    sink: Option<LogSink>,
}

impl Console {
    pub fn new(limit: usize) -> Self {
        Console {
            entries: Vec::new(),
            limit,
            truncated: false,
            sink: None,
        }
    }

    pub fn set_sink(&mut self, sink: LogSink) {
        self.sink = Some(sink);
    }

    /// Captures one console call.
    ///
    /// Once `limit` entries exist, a single warning noting the truncation is
    /// appended in place of the call and everything after it is dropped.
    /// Returns the entry that was actually stored, if any.
    pub fn emit(&mut self, kind: LogKind, content: String) -> Option<LogEntry> {
        if self.truncated {
            return None;
        }
        let timestamp = self.entries.len() as u64;
        let entry = if self.entries.len() >= self.limit {
            self.truncated = true;
            LogEntry::new(
                LogKind::Warn,
                format!("Console output truncated after {} entries", self.limit),
                timestamp,
            )
        } else {
            LogEntry::new(kind, content, timestamp)
        };
        if let Some(sink) = self.sink.as_mut() {
            sink(&entry);
        }
        self.entries.push(entry.clone());
        Some(entry)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn entries_are_numbered_in_call_order() {
        let mut console = Console::new(10);
        console.emit(LogKind::Log, "a".into());
        console.emit(LogKind::Error, "b".into());
        let entries = console.into_entries();
        assert_eq!(entries[0], LogEntry::new(LogKind::Log, "a", 0));
        assert_eq!(entries[1], LogEntry::new(LogKind::Error, "b", 1));
    }

    #[test]
    fn output_past_the_cap_is_replaced_by_one_warning() {
        let mut console = Console::new(2);
        for i in 0..5 {
            console.emit(LogKind::Log, i.to_string());
        }
        let entries = console.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].kind, LogKind::Warn);
        assert_eq!(entries[2].content, "Console output truncated after 2 entries");
    }

    #[test]
    fn sink_sees_every_stored_entry() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut console = Console::new(1);
        let sink_seen = seen.clone();
        console.set_sink(Box::new(move |entry: &LogEntry| sink_seen.borrow_mut().push(entry.content.clone())));
        console.emit(LogKind::Info, "first".into());
        console.emit(LogKind::Info, "second".into());
        console.emit(LogKind::Info, "third".into());
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[0], "first");
    }
}
