//! Script front end and tree-walking runtime for runlab.
//!
//! The crate owns everything that understands user code:
//!
//! - [`lexer`] and [`parser`] turn JavaScript-subset source into the [`ast`]
//! - [`printer`] turns an AST back into source text
//! - [`instrument`] rewrites a program to call the trace hook after each
//!   statement, producing source that still runs unchanged
//! - [`interpreter`] executes a program with captured console output,
//!   timers, promises and (when instrumented) a recorded timeline

pub mod ast;
pub mod error;
pub mod instrument;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod printer;

pub use error::{InstrumentError, ParseError};
pub use instrument::{instrument, Instrumented, TRACE_HOOK};
pub use interpreter::{ExecutionState, Interpreter, InterpreterConfig, RunOutcome};
pub use parser::parse_program;
pub use printer::print_program;

/// Stack reserved for threads that run user scripts. The interpreter
/// recurses on the native stack, so nested calls up to
/// [`InterpreterConfig::max_call_depth`] need far more than the default.
pub const SCRIPT_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Runs `f` on a dedicated thread with a [`SCRIPT_STACK_SIZE`] stack and
/// waits for it.
pub fn with_script_stack<T, F>(f: F) -> std::io::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name("runlab-script".into())
        .stack_size(SCRIPT_STACK_SIZE)
        .spawn(f)?;
    handle
        .join()
        .map_err(|_| std::io::Error::other("script thread panicked"))
}
