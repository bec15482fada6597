//! Front-end error types.

use serde::Serialize;
use thiserror::Error;

/// A lexing or parsing failure, positioned at the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message} (line {line}, column {column})")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        ParseError {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Reasons the instrumentor refuses a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstrumentError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("identifier `{name}` is reserved (line {line}, column {column})")]
    ReservedIdentifier {
        name: String,
        line: u32,
        column: u32,
    },
}
