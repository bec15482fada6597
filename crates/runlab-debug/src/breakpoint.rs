use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Line breakpoints of one session.
///
/// Plain set semantics: lines are not checked against the source, and a
/// breakpoint on a line that never emits a state simply never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BreakpointSet {
    lines: BTreeSet<u32>,
}

impl BreakpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `line` if absent, removes it otherwise. Returns whether the line
    /// is set afterwards.
    pub fn toggle(&mut self, line: u32) -> bool {
        if self.lines.remove(&line) {
            false
        } else {
            self.lines.insert(line);
            true
        }
    }

    pub fn contains(&self, line: u32) -> bool {
        self.lines.contains(&line)
    }

    /// Set lines in ascending order.
    pub fn lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.lines.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl FromIterator<u32> for BreakpointSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        BreakpointSet {
            lines: iter.into_iter().collect(),
        }
    }
}
