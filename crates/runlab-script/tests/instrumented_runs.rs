//! End-to-end runs of instrumented and plain programs.

use proptest::prelude::*;
use runlab_core::TraceLabel;
use runlab_script::{instrument, with_script_stack, Interpreter, InterpreterConfig, RunOutcome};

fn execute(source: String, trace_enabled: bool) -> RunOutcome {
    with_script_stack(move || {
        Interpreter::new(InterpreterConfig {
            trace_enabled,
            random_seed: Some(1),
            ..InterpreterConfig::default()
        })
        .run_source(&source)
    })
    .expect("script thread")
}

fn program(start: i32, count: u8, step: i32, threshold: i32, label: &str) -> String {
    format!(
        "let total = {start};\n\
         const seen = [];\n\
         for (let i = 0; i < {count}; i++) {{\n\
           seen.push(i * {step});\n\
           total += i;\n\
         }}\n\
         function describe(n) {{\n\
           if (n > {threshold}) {{\n\
             return '{label}:big';\n\
           }}\n\
           return '{label}:small';\n\
         }}\n\
         console.log(describe(total), seen.join(','));\n\
         total"
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn instrumentation_does_not_change_behavior(
        start in -50i32..50,
        count in 0u8..12,
        step in -5i32..5,
        threshold in -20i32..80,
        label in "[a-z]{1,6}",
    ) {
        let source = program(start, count, step, threshold, &label);
        let instrumented = instrument(&source).expect("instrument");

        let plain = execute(source, false);
        let traced = execute(instrumented.code, true);

        prop_assert_eq!(&plain.logs, &traced.logs);
        prop_assert_eq!(&plain.result, &traced.result);
        prop_assert_eq!(&plain.error, &traced.error);

        let timeline = traced.timeline.expect("timeline");
        prop_assert!(timeline.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        prop_assert!(timeline
            .iter()
            .filter_map(|e| e.data.line)
            .all(|line| (1..=14).contains(&line)));
    }
}

#[test]
fn loop_checkpoints_follow_each_iteration() {
    let source = "let sum = 0;\nfor (let i = 1; i <= 3; i++) {\n  sum += i;\n}\nconsole.log(sum);";
    let instrumented = instrument(source).expect("instrument");
    let outcome = execute(instrumented.code, true);

    assert_eq!(outcome.logs[0].content, "6");
    let timeline = outcome.timeline.expect("timeline");
    let sums: Vec<_> = timeline
        .iter()
        .filter(|e| e.label == TraceLabel::Line && e.data.line == Some(3))
        .filter_map(|e| e.data.variables.iter().find(|v| v.name == "sum"))
        .map(|v| v.value.clone())
        .collect();
    assert_eq!(sums, vec![serde_json::json!(1), serde_json::json!(3), serde_json::json!(6)]);
    assert!(timeline
        .iter()
        .any(|e| e.label == TraceLabel::Log && e.data.message.as_deref() == Some("6")));
}

#[test]
fn errors_end_the_timeline() {
    let source = "let a = 1;\nundefinedFn(a);";
    let instrumented = instrument(source).expect("instrument");
    let outcome = execute(instrumented.code, true);

    assert_eq!(
        outcome.error.as_deref(),
        Some("ReferenceError: undefinedFn is not defined")
    );
    let timeline = outcome.timeline.expect("timeline");
    let last = timeline.last().expect("event");
    assert_eq!(last.label, TraceLabel::Error);
    assert_eq!(
        last.data.message.as_deref(),
        Some("ReferenceError: undefinedFn is not defined")
    );
}

#[test]
fn reserved_hook_name_is_rejected() {
    assert!(instrument("__runlab_trace(1, 'x');").is_err());
}
