//! Plain-text rendering of run results and debugger states.

use runlab_core::{DebugState, ExecutionResult, ExecutionStatus, LogEntry};

/// Exit code for a settled run: 0 = success, 1 = runtime exception,
/// 2 = timeout, 3 = the run never executed or its sandbox failed.
pub fn exit_code(status: ExecutionStatus) -> i32 {
    match status {
        ExecutionStatus::Success => 0,
        ExecutionStatus::RuntimeException => 1,
        ExecutionStatus::Timeout => 2,
        ExecutionStatus::UnsupportedLanguage
        | ExecutionStatus::InstrumentationFailure
        | ExecutionStatus::TransportError => 3,
    }
}

pub fn log_line(entry: &LogEntry) -> String {
    format!("[{}] {}", entry.kind.as_str(), entry.content)
}

/// Lines printed for a finished run, logs first.
pub fn result_lines(result: &ExecutionResult) -> Vec<String> {
    let mut lines: Vec<String> = result.logs.iter().map(log_line).collect();
    if let Some(value) = &result.result {
        lines.push(format!("=> {}", value));
    }
    if let Some(error) = &result.error {
        lines.push(format!("{}: {}", result.status.label(), error));
    }
    lines
}

/// One debugger state: position header, call stack, then variables.
pub fn state_lines(index: usize, total: usize, state: &DebugState) -> Vec<String> {
    let mut lines = vec![format!(
        "[{}/{}] line {}{}",
        index + 1,
        total,
        state.line,
        state
            .code_snippet
            .as_deref()
            .map(|s| format!(": {}", s.trim()))
            .unwrap_or_default()
    )];
    if !state.call_stack.is_empty() {
        lines.push(format!("  stack: {}", state.call_stack.join(" > ")));
    }
    for var in &state.variables {
        lines.push(format!("  {} = {} ({})", var.name, var.value, var.type_tag));
    }
    lines
}
