//! Navigation invariants of the replay debugger.

use proptest::prelude::*;
use runlab_core::{Timeline, TraceEvent};
use runlab_debug::{BreakpointSet, ContinueStop, DebuggerState, ReplayDebugger};

#[derive(Debug, Clone)]
enum Op {
    Forward,
    Backward,
    Continue,
    Select(usize),
    Toggle(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Forward),
        Just(Op::Backward),
        Just(Op::Continue),
        (0usize..40).prop_map(Op::Select),
        (1u32..12).prop_map(Op::Toggle),
    ]
}

fn timeline(lines: &[u32]) -> Timeline {
    let events = lines
        .iter()
        .enumerate()
        .map(|(i, &line)| TraceEvent::line(i as u64, line, vec![], None, vec!["<global>".into()]))
        .collect();
    Timeline::new(events).unwrap()
}

proptest! {
    #[test]
    fn index_always_stays_in_range(
        lines in prop::collection::vec(1u32..12, 1..30),
        ops in prop::collection::vec(op(), 0..60),
    ) {
        let timeline = timeline(&lines);
        let mut debugger = ReplayDebugger::new();
        let mut breakpoints = BreakpointSet::new();
        debugger.start(Some(&timeline), "").unwrap();

        for op in ops {
            let before = debugger.index().unwrap();
            match op {
                Op::Forward => {
                    let after = debugger.step_forward().unwrap();
                    prop_assert_eq!(after, (before + 1).min(lines.len() - 1));
                }
                Op::Backward => {
                    let after = debugger.step_backward().unwrap();
                    prop_assert_eq!(after, before.saturating_sub(1));
                }
                Op::Continue => {
                    let expected = lines
                        .iter()
                        .enumerate()
                        .skip(before + 1)
                        .find(|(_, line)| breakpoints.contains(**line))
                        .map(|(i, _)| i);
                    match debugger.continue_to_breakpoint(&breakpoints).unwrap() {
                        ContinueStop::Breakpoint { index, line } => {
                            prop_assert_eq!(Some(index), expected);
                            prop_assert_eq!(line, lines[index]);
                        }
                        ContinueStop::End { index } => {
                            prop_assert_eq!(expected, None);
                            prop_assert_eq!(index, lines.len() - 1);
                        }
                    }
                }
                Op::Select(index) => {
                    let result = debugger.select(index);
                    prop_assert_eq!(result.is_ok(), index < lines.len());
                }
                Op::Toggle(line) => {
                    breakpoints.toggle(line);
                }
            }
            match debugger.state() {
                DebuggerState::Debugging { index } => prop_assert!(index < lines.len()),
                DebuggerState::Idle => prop_assert!(false, "debugger went idle"),
            }
            prop_assert_eq!(debugger.current().map(|s| s.line), debugger.index().map(|i| lines[i]));
        }
    }

    #[test]
    fn heuristic_start_is_deterministic(
        values in prop::collection::vec(-100i32..100, 1..10),
    ) {
        let source: String = values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("let v{i} = {v};\nv{i} += 1;\n// note {i}\n"))
            .collect();
        let mut first = ReplayDebugger::new();
        let mut second = ReplayDebugger::new();
        first.start(None, &source).unwrap();
        second.start(None, &source).unwrap();
        prop_assert_eq!(first.states(), second.states());
        prop_assert_eq!(first.len(), values.len() * 2);
    }
}
