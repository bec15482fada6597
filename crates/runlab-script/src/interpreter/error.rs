//! Runtime error types for the interpreter.

use thiserror::Error;

use super::format::describe_thrown;
use super::value::Value;

/// Errors raised while executing a program.
///
/// Every variant is catchable from script code: `try/catch` converts it to
/// a JavaScript value with [`RuntimeError::into_value`]. The `Display` form
/// is what ends up in an execution result's `error` field.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// A value passed to `throw` (or a rejected promise that was awaited).
    #[error("{}", describe_thrown(.0))]
    Thrown(Value),

    #[error("ReferenceError: {name} is not defined")]
    NotDefined { name: String },

    #[error("TypeError: Assignment to constant variable.")]
    ConstAssignment { name: String },

    #[error("SyntaxError: Identifier '{name}' has already been declared")]
    Redeclared { name: String },

    #[error("TypeError: {message}")]
    TypeError { message: String },

    #[error("RangeError: {message}")]
    RangeError { message: String },

    #[error("SyntaxError: {message}")]
    SyntaxError { message: String },

    #[error("RangeError: Maximum call stack size exceeded")]
    CallDepthExceeded { limit: usize },

    /// `await` on a promise that nothing can settle any more.
    #[error("Error: awaited promise can never settle (no pending timers)")]
    Stalled,
}

impl RuntimeError {
    pub fn type_error(message: impl Into<String>) -> Self {
        RuntimeError::TypeError {
            message: message.into(),
        }
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        RuntimeError::RangeError {
            message: message.into(),
        }
    }

    /// The JavaScript error class this error surfaces as.
    pub fn class_name(&self) -> &'static str {
        match self {
            RuntimeError::Thrown(_) | RuntimeError::Stalled => "Error",
            RuntimeError::NotDefined { .. } => "ReferenceError",
            RuntimeError::ConstAssignment { .. } | RuntimeError::TypeError { .. } => "TypeError",
            RuntimeError::Redeclared { .. } | RuntimeError::SyntaxError { .. } => "SyntaxError",
            RuntimeError::RangeError { .. } | RuntimeError::CallDepthExceeded { .. } => "RangeError",
        }
    }

    /// Converts the error into the value a `catch` clause receives.
    pub fn into_value(self) -> Value {
        match self {
            RuntimeError::Thrown(value) => value,
            other => {
                let rendered = other.to_string();
                let prefix = format!("{}: ", other.class_name());
                let message = rendered.strip_prefix(&prefix).unwrap_or(&rendered);
                Value::error(other.class_name(), message)
            }
        }
    }
}
