//! Worker process loop.
//!
//! Reads a single [`SandboxRequest`] from `input` until EOF, runs it on a
//! large-stack thread and writes newline-delimited [`WorkerMessage`]s to
//! `output`: one `log` line per console entry as it happens, then exactly one
//! `settled` line. Each line is flushed immediately so a coordinator that
//! kills the process still holds everything written before the kill.

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::rc::Rc;

use runlab_core::{LogEntry, SandboxRequest, WorkerMessage};
use runlab_script::interpreter::LogSink;
use tracing::{debug, info};

use crate::error::WorkerError;
use crate::runtime;

/// Serves one request from `input`, answering on `output`.
pub fn serve<R, W>(mut input: R, output: W) -> Result<(), WorkerError>
where
    R: Read,
    W: Write + Send + 'static,
{
    let mut raw = String::new();
    input.read_to_string(&mut raw)?;
    let request: SandboxRequest = serde_json::from_str(&raw)?;
    info!(id = %request.id, instrument = request.instrument, "request received");

    runlab_script::with_script_stack(move || answer(request, output))?
}

fn answer<W: Write + 'static>(request: SandboxRequest, output: W) -> Result<(), WorkerError> {
    let writer = Rc::new(RefCell::new(output));
    let write_failure: Rc<RefCell<Option<io::Error>>> = Rc::new(RefCell::new(None));

    let sink: LogSink = {
        let writer = writer.clone();
        let write_failure = write_failure.clone();
        let id = request.id.clone();
        Box::new(move |entry: &LogEntry| {
            if write_failure.borrow().is_some() {
                return;
            }
            let message = WorkerMessage::Log {
                id: id.clone(),
                entry: entry.clone(),
            };
            if let Err(err) = write_message(&mut *writer.borrow_mut(), &message) {
                *write_failure.borrow_mut() = Some(err);
            }
        })
    };

    let response = runtime::execute(&request, sink);
    if let Some(err) = write_failure.borrow_mut().take() {
        return Err(err.into());
    }
    debug!(id = %request.id, "writing settlement");
    let settled = WorkerMessage::Settled {
        id: request.id,
        response,
    };
    write_message(&mut *writer.borrow_mut(), &settled)?;
    Ok(())
}

fn write_message<W: Write>(out: &mut W, message: &WorkerMessage) -> io::Result<()> {
    let line = message.to_line().map_err(io::Error::other)?;
    out.write_all(line.as_bytes())?;
    out.flush()
}
