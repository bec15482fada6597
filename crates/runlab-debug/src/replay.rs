//! Replay debugger state machine.
//!
//! `Idle -> Debugging(index)` on [`ReplayDebugger::start`], back to `Idle` on
//! [`ReplayDebugger::stop`]. While debugging, `index` always points into the
//! active state list: stepping clamps at both ends and random access rejects
//! out-of-range rows.

use runlab_core::{DebugState, Timeline};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::breakpoint::BreakpointSet;
use crate::error::DebugError;
use crate::heuristic::{self, HEURISTIC_NOTICE};

/// Where the replayed states came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    /// One state per `line` event of a recorded timeline.
    Runtime,
    /// States reconstructed from the source text.
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerState {
    Idle,
    Debugging { index: usize },
}

/// Where a continue-to-breakpoint landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ContinueStop {
    Breakpoint { index: usize, line: u32 },
    /// No later state matched; parked on the last state.
    End { index: usize },
}

impl ContinueStop {
    pub fn index(&self) -> usize {
        match self {
            ContinueStop::Breakpoint { index, .. } | ContinueStop::End { index } => *index,
        }
    }
}

/// Serializable snapshot of the debugger for a UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugView {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ReplayMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<DebugState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<&'static str>,
}

#[derive(Debug, Clone)]
struct Session {
    mode: ReplayMode,
    states: Vec<DebugState>,
    index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayDebugger {
    session: Option<Session>,
}

impl ReplayDebugger {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Starts replaying at the first state.
    ///
    /// Uses the timeline when it has at least one `line` event; otherwise
    /// reconstructs states from `source`. Restarting discards the previous
    /// position.
    pub fn start(&mut self, timeline: Option<&Timeline>, source: &str) -> Result<ReplayMode, DebugError> {
        let runtime_states: Vec<DebugState> = timeline
            .map(|t| t.events().iter().filter_map(|e| e.to_debug_state()).collect())
            .unwrap_or_default();
        if !runtime_states.is_empty() {
            return self.begin(ReplayMode::Runtime, runtime_states);
        }
        self.start_heuristic(source)
    }

    /// Starts in heuristic mode regardless of any timeline.
    pub fn start_heuristic(&mut self, source: &str) -> Result<ReplayMode, DebugError> {
        self.begin(ReplayMode::Heuristic, heuristic::reconstruct(source))
    }

    fn begin(&mut self, mode: ReplayMode, states: Vec<DebugState>) -> Result<ReplayMode, DebugError> {
        if states.is_empty() {
            self.session = None;
            return Err(DebugError::NothingToReplay);
        }
        debug!(?mode, states = states.len(), "replay started");
        self.session = Some(Session {
            mode,
            states,
            index: 0,
        });
        Ok(mode)
    }

    /// Discards all replay state.
    pub fn stop(&mut self) {
        self.session = None;
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn state(&self) -> DebuggerState {
        match &self.session {
            Some(session) => DebuggerState::Debugging {
                index: session.index,
            },
            None => DebuggerState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn mode(&self) -> Option<ReplayMode> {
        self.session.as_ref().map(|s| s.mode)
    }

    pub fn index(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.index)
    }

    pub fn current(&self) -> Option<&DebugState> {
        self.session.as_ref().and_then(|s| s.states.get(s.index))
    }

    pub fn states(&self) -> &[DebugState] {
        self.session.as_ref().map(|s| s.states.as_slice()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.states().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states().is_empty()
    }

    pub fn view(&self) -> DebugView {
        DebugView {
            active: self.is_active(),
            mode: self.mode(),
            index: self.index(),
            total: self.len(),
            state: self.current().cloned(),
            notice: (self.mode() == Some(ReplayMode::Heuristic)).then_some(HEURISTIC_NOTICE),
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    fn session_mut(&mut self) -> Result<&mut Session, DebugError> {
        self.session.as_mut().ok_or(DebugError::NotDebugging)
    }

    /// Moves one state forward; stays put on the last state.
    pub fn step_forward(&mut self) -> Result<usize, DebugError> {
        let session = self.session_mut()?;
        if session.index + 1 < session.states.len() {
            session.index += 1;
        }
        Ok(session.index)
    }

    /// Moves one state back; stays put on the first state.
    pub fn step_backward(&mut self) -> Result<usize, DebugError> {
        let session = self.session_mut()?;
        session.index = session.index.saturating_sub(1);
        Ok(session.index)
    }

    /// Jumps to the first later state whose line is a breakpoint, or to the
    /// last state when none matches.
    pub fn continue_to_breakpoint(&mut self, breakpoints: &BreakpointSet) -> Result<ContinueStop, DebugError> {
        let session = self.session_mut()?;
        let hit = session
            .states
            .iter()
            .enumerate()
            .skip(session.index + 1)
            .find(|(_, state)| breakpoints.contains(state.line));
        let stop = match hit {
            Some((index, state)) => ContinueStop::Breakpoint {
                index,
                line: state.line,
            },
            None => ContinueStop::End {
                index: session.states.len() - 1,
            },
        };
        session.index = stop.index();
        Ok(stop)
    }

    /// Random access to a row of the state list.
    pub fn select(&mut self, index: usize) -> Result<usize, DebugError> {
        let session = self.session_mut()?;
        if index >= session.states.len() {
            return Err(DebugError::IndexOutOfRange {
                index,
                len: session.states.len(),
            });
        }
        session.index = index;
        Ok(index)
    }
}
