//! Tree-walking interpreter for the supported JavaScript subset.
//!
//! Executes a parsed [`Program`](crate::ast::Program) with captured console
//! output, a deterministic-per-seed `Math.random`, timers, promises and
//! `async`/`await`.
//!
//! # Architecture
//!
//! - [`Interpreter`] owns the global scope, the console buffer, the
//!   microtask queue and the timer list, and drives a run to completion.
//! - [`ExecutionState`] tracks the lifecycle: `Ready -> (Completed | Error)`.
//! - [`Value`] is the runtime representation of all values; arrays, objects
//!   and promises are shared through `Rc<RefCell<..>>`.
//! - [`RuntimeError`] covers both thrown script values and engine-raised
//!   errors, and renders the way a JavaScript engine reports them.
//! - When [`InterpreterConfig::trace_enabled`] is set, calls to the trace hook
//!   inserted by [`instrument`](crate::instrument::instrument) are recorded
//!   as timeline events instead of being looked up as functions.
//!
//! # Usage
//!
//! ```ignore
//! let outcome = Interpreter::new(InterpreterConfig::default()).run_source("console.log(1 + 1)");
//! assert_eq!(outcome.logs[0].content, "2");
//! ```
//!
//! The interpreter recurses on the native stack; run it inside
//! [`with_script_stack`](crate::with_script_stack).

pub mod builtins;
pub mod console;
pub mod env;
pub mod error;
pub mod eval;
pub mod format;
pub mod methods;
pub mod ops;
pub mod promise;
pub mod state;
pub mod trace;
pub mod value;

pub use console::LogSink;
pub use error::RuntimeError;
pub use state::{ExecutionState, Interpreter, InterpreterConfig, RunOutcome};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::instrument;
    use runlab_core::{LogKind, TraceLabel};
    use serde_json::json;

    fn run_with(source: &str, config: InterpreterConfig) -> RunOutcome {
        let source = source.to_string();
        crate::with_script_stack(move || Interpreter::new(config).run_source(&source))
            .expect("script thread")
    }

    fn run(source: &str) -> RunOutcome {
        run_with(
            source,
            InterpreterConfig {
                random_seed: Some(7),
                ..InterpreterConfig::default()
            },
        )
    }

    fn contents(outcome: &RunOutcome) -> Vec<&str> {
        outcome.logs.iter().map(|e| e.content.as_str()).collect()
    }

    #[test]
    fn console_log_is_captured_without_result() {
        let outcome = run("console.log(1 + 1)");
        assert_eq!(contents(&outcome), vec!["2"]);
        assert_eq!(outcome.logs[0].kind, LogKind::Log);
        assert_eq!(outcome.result, None);
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.timeline, None);
    }

    #[test]
    fn last_expression_is_the_result() {
        let outcome = run("const xs = [1, 2, 3];\nxs.reduce((a, b) => a + b, 0) * 2");
        assert_eq!(outcome.result, Some(json!(12)));
    }

    #[test]
    fn uncaught_error_is_reported() {
        let outcome = run("console.log('before');\nthrow new Error('x');\nconsole.log('after');");
        assert_eq!(contents(&outcome), vec!["before"]);
        assert_eq!(outcome.error.as_deref(), Some("Error: x"));
        assert_eq!(outcome.result, None);
    }

    #[test]
    fn syntax_errors_surface_as_errors() {
        let outcome = run("let = ;");
        let error = outcome.error.expect("error");
        assert!(error.starts_with("SyntaxError"), "{error}");
    }

    #[test]
    fn instrumented_run_records_line_events() {
        let instrumented = instrument("let a = 1;\na = 2;").expect("instrument");
        let outcome = run_with(
            &instrumented.code,
            InterpreterConfig {
                trace_enabled: true,
                ..InterpreterConfig::default()
            },
        );
        assert_eq!(outcome.error, None);
        let timeline = outcome.timeline.expect("timeline");
        let lines: Vec<_> = timeline
            .iter()
            .filter(|e| e.label == TraceLabel::Line)
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].data.line, Some(1));
        assert_eq!(lines[0].data.variables[0].value, json!(1));
        assert_eq!(lines[1].data.line, Some(2));
        assert_eq!(lines[1].data.variables[0].value, json!(2));
        assert_eq!(lines[1].data.call_stack, vec!["<global>".to_string()]);
        assert_eq!(timeline.last().map(|e| e.label), Some(TraceLabel::Result));
        assert!(timeline.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn checkpoints_inside_functions_carry_the_call_stack() {
        let instrumented = instrument("function inc(x) {\n  const y = x + 1;\n  return y;\n}\ninc(1);").expect("instrument");
        let outcome = run_with(
            &instrumented.code,
            InterpreterConfig {
                trace_enabled: true,
                ..InterpreterConfig::default()
            },
        );
        let timeline = outcome.timeline.expect("timeline");
        let inner = timeline
            .iter()
            .find(|e| e.data.line == Some(2))
            .expect("line 2 event");
        assert_eq!(inner.data.call_stack, vec!["<global>".to_string(), "inc".to_string()]);
    }

    #[test]
    fn let_loop_bindings_are_per_iteration() {
        let outcome = run(
            "const fs = [];\nfor (let i = 0; i < 3; i++) { fs.push(() => i); }\nconsole.log(fs.map(f => f()).join(','));",
        );
        assert_eq!(contents(&outcome), vec!["0,1,2"]);
    }

    #[test]
    fn try_catch_finally_runs_in_order() {
        let outcome = run(
            "try { null.x; } catch (e) { console.log(e.name); } finally { console.log('done'); }",
        );
        assert_eq!(contents(&outcome), vec!["TypeError", "done"]);
    }

    #[test]
    fn microtasks_run_before_timers() {
        let outcome = run(
            "setTimeout(() => console.log('timeout'), 0);\nPromise.resolve().then(() => console.log('micro'));\nconsole.log('sync');",
        );
        assert_eq!(contents(&outcome), vec!["sync", "micro", "timeout"]);
    }

    #[test]
    fn async_functions_finish_before_their_caller_resumes() {
        let outcome = run(
            "async function f() {\n  await delay(5);\n  console.log('after');\n  return 7;\n}\nf().then(v => console.log(v));\nconsole.log('first');",
        );
        assert_eq!(contents(&outcome), vec!["after", "first", "7"]);
    }

    #[test]
    fn oversized_arrays_are_range_errors() {
        for source in [
            "console.log('before'); let a = []; a.length = 4294967295; 1",
            "console.log('before'); let a = []; a[1e9] = 1; 1",
            "console.log('before'); new Array(2e9); 1",
            "console.log('before'); Array.from({ length: 1e12 }); 1",
        ] {
            let outcome = run(source);
            assert_eq!(contents(&outcome), vec!["before"], "{source}");
            assert_eq!(outcome.result, None, "{source}");
            assert_eq!(
                outcome.error.as_deref(),
                Some("RangeError: Invalid array length"),
                "{source}"
            );
        }
    }

    #[test]
    fn array_growth_respects_the_configured_maximum() {
        let config = || InterpreterConfig {
            max_array_length: 4,
            ..InterpreterConfig::default()
        };
        let outcome = run_with("const a = [1, 2, 3];\na.push(4);\na.length", config());
        assert_eq!(outcome.result, Some(json!(4)));

        let outcome = run_with(
            "const a = [1, 2, 3, 4];\ntry { a.push(5); } catch (e) { console.log(e.name, e.message); }\na.concat([5]);",
            config(),
        );
        assert_eq!(contents(&outcome), vec!["RangeError Invalid array length"]);
        assert_eq!(outcome.error.as_deref(), Some("RangeError: Invalid array length"));
    }

    #[test]
    fn oversized_strings_are_range_errors() {
        let outcome = run("'ab'.repeat(1e12)");
        assert_eq!(outcome.error.as_deref(), Some("RangeError: Invalid string length"));

        let outcome = run_with(
            "let s = 'x';\nwhile (true) s = s + s;",
            InterpreterConfig {
                max_string_length: 1024,
                ..InterpreterConfig::default()
            },
        );
        assert_eq!(outcome.error.as_deref(), Some("RangeError: Invalid string length"));
    }

    #[test]
    fn parse_int_detects_hex_prefixes() {
        let outcome = run("[parseInt('0x1f'), parseInt('0x1f', 16), parseInt('0x1f', 10), Number.parseInt('12px')]");
        assert_eq!(outcome.result, Some(json!([31, 31, 0, 12])));
    }

    #[test]
    fn non_index_array_keys_are_ignored() {
        let outcome = run("const a = [1];\na[-1] = 2;\na[1.5] = 3;\n[a.length, a[-1]]");
        assert_eq!(outcome.result, Some(json!([1, null])));
    }

    #[test]
    fn top_level_promise_result_is_awaited() {
        let outcome = run("Promise.all([1, delay(1).then(() => 2)])");
        assert_eq!(outcome.result, Some(json!([1, 2])));
    }

    #[test]
    fn runaway_recursion_is_a_range_error() {
        let outcome = run("function f(n) { return f(n + 1); }\nf(0);");
        assert_eq!(
            outcome.error.as_deref(),
            Some("RangeError: Maximum call stack size exceeded")
        );
    }

    #[test]
    fn console_output_is_capped() {
        let outcome = run_with(
            "for (let i = 0; i < 10; i++) console.log(i);",
            InterpreterConfig {
                max_log_entries: 3,
                ..InterpreterConfig::default()
            },
        );
        assert_eq!(outcome.logs.len(), 4);
        let last = outcome.logs.last().expect("entry");
        assert_eq!(last.kind, LogKind::Warn);
        assert_eq!(last.content, "Console output truncated after 3 entries");
    }

    #[test]
    fn seeded_random_is_reproducible() {
        let source = "[Math.random(), Math.random()]";
        assert_eq!(run(source).result, run(source).result);
    }

    #[test]
    fn optional_chaining_short_circuits() {
        let outcome = run("const o = { a: { b: 1 } };\nconsole.log(o?.a?.b, o.x?.y);");
        assert_eq!(contents(&outcome), vec!["1 undefined"]);
    }

    #[test]
    fn awaiting_a_promise_that_never_settles_fails() {
        let outcome = run("await new Promise(() => {});");
        let error = outcome.error.expect("error");
        assert!(error.contains("never settle"), "{error}");
    }

    #[test]
    fn array_and_string_methods() {
        let outcome = run(
            "console.log([3, 1, 2].sort().join('-'));\nconsole.log([1, 2, 3, 4].filter(n => n % 2 === 0));\nconsole.log('a-b-c'.split('-').reverse().join(''), 'abc'.padStart(5, '*'));\nconsole.log([10, 1, 5].sort((a, b) => a - b));",
        );
        assert_eq!(
            contents(&outcome),
            vec!["1-2-3", "[2,4]", "cba **abc", "[1,5,10]"]
        );
    }

    #[test]
    fn log_sink_sees_entries_as_they_happen() {
        let seen = crate::with_script_stack(|| {
            let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
            let sink_seen = seen.clone();
            let interpreter = Interpreter::new(InterpreterConfig::default()).with_log_sink(Box::new(
                move |entry: &runlab_core::LogEntry| sink_seen.borrow_mut().push(entry.content.clone()),
            ));
            interpreter.run_source("console.log('a'); console.warn('b');");
            let collected = seen.borrow().clone();
            collected
        })
        .expect("script thread");
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
    }
}
