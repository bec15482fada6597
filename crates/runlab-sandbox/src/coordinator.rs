//! Execution coordinator: one isolated worker process per run.
//!
//! # Lifecycle
//!
//! `submit` validates the language, claims the single-flight slot,
//! optionally instruments the source, spawns the worker, writes the request
//! and then waits for the first of:
//!
//! - a `settled` message with the request's id
//! - a transport failure (spawn/write/read error, malformed line, EOF)
//! - the deadline
//!
//! The wait loop breaks exactly once, so every request settles exactly once;
//! anything the worker writes afterwards is never read. On every path the
//! worker is killed (if still alive) and reaped before `submit` returns, and
//! the single-flight slot is released by [`FlightGuard`]'s `Drop`.
//!
//! Console entries streamed before a timeout or transport failure are kept
//! as the result's `logs`; a partial timeline is never delivered.

use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use runlab_core::{
    ExecutionRequest, ExecutionResult, Language, LogEntry, RequestId, SandboxRequest,
    SandboxResponse, WorkerMessage,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::{SandboxConfig, ENV_SANDBOX_LOG};
use crate::error::SubmitError;
use crate::runtime::elapsed_ms;

/// Grace period for reaping a worker after it settled or was killed.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// How a dispatched run ended, before it is folded into a result.
enum Settlement {
    Response(SandboxResponse),
    Timeout,
    Transport(String),
}

/// Dispatches runs to sandbox worker processes.
///
/// Cloning yields a handle to the same single-flight slot.
#[derive(Clone)]
pub struct Coordinator {
    config: Arc<SandboxConfig>,
    in_flight: Arc<Mutex<Option<RequestId>>>,
    last_pid: Arc<AtomicU32>,
}

/// Holds the single-flight slot for one run.
struct FlightGuard {
    slot: Arc<Mutex<Option<RequestId>>>,
}

impl FlightGuard {
    fn claim(slot: &Arc<Mutex<Option<RequestId>>>, id: &RequestId) -> Result<Self, SubmitError> {
        let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(in_flight) = current.as_ref() {
            return Err(SubmitError::Busy {
                in_flight: in_flight.clone(),
            });
        }
        *current = Some(id.clone());
        Ok(FlightGuard { slot: slot.clone() })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Coordinator {
    pub fn new(config: SandboxConfig) -> Self {
        Coordinator {
            config: Arc::new(config),
            in_flight: Arc::new(Mutex::new(None)),
            last_pid: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Whether a run is currently outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Process id of the most recently spawned worker.
    pub fn last_sandbox_pid(&self) -> Option<u32> {
        match self.last_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Runs `request` in a fresh sandbox.
    ///
    /// Every outcome of the untrusted run, including timeouts and worker
    /// crashes, is an `Ok` result. The only error is a refused submission
    /// while another run is in flight.
    pub async fn submit(&self, request: ExecutionRequest) -> Result<ExecutionResult, SubmitError> {
        if Language::normalize(&request.language).is_none() {
            warn!(id = %request.id, language = %request.language, "unsupported language");
            return Ok(ExecutionResult::unsupported_language(request.id, &request.language));
        }
        let _guard = FlightGuard::claim(&self.in_flight, &request.id)?;
        let started = Instant::now();

        let code = if request.instrument {
            match instrument_source(request.code).await {
                Ok(code) => code,
                Err(message) => {
                    warn!(id = %request.id, "instrumentation failed: {}", message);
                    return Ok(ExecutionResult::instrumentation_failure(
                        request.id,
                        &message,
                        elapsed_ms(started),
                    ));
                }
            }
        } else {
            request.code
        };

        let sandbox_request = SandboxRequest {
            id: request.id.clone(),
            code,
            language: request.language,
            instrument: request.instrument,
            limits: self.config.limits,
        };
        info!(id = %request.id, instrument = request.instrument, "dispatching run");

        let mut partial_logs = Vec::new();
        let settlement = self.dispatch(&sandbox_request, &mut partial_logs).await;
        let duration_ms = elapsed_ms(started);

        let result = match settlement {
            Settlement::Response(response) => {
                info!(id = %request.id, duration_ms, failed = response.error.is_some(), "run settled");
                ExecutionResult::from_response(request.id, response, request.instrument, duration_ms)
            }
            Settlement::Timeout => {
                warn!(id = %request.id, duration_ms, "run timed out");
                ExecutionResult::timeout(request.id, self.config.timeout_ms(), partial_logs, duration_ms)
            }
            Settlement::Transport(message) => {
                warn!(id = %request.id, duration_ms, "sandbox transport error: {}", message);
                ExecutionResult::transport_error(request.id, &message, partial_logs, duration_ms)
            }
        };
        Ok(result)
    }

    async fn dispatch(&self, request: &SandboxRequest, partial_logs: &mut Vec<LogEntry>) -> Settlement {
        let deadline = tokio::time::Instant::now() + self.config.timeout;
        let mut child = match self.spawn_worker() {
            Ok(child) => child,
            Err(err) => return Settlement::Transport(format!("failed to spawn sandbox: {err}")),
        };
        if let Some(pid) = child.id() {
            self.last_pid.store(pid, Ordering::SeqCst);
        }

        let settlement = match tokio::time::timeout_at(deadline, write_request(&mut child, request)).await {
            Err(_) => Settlement::Timeout,
            Ok(Err(err)) => Settlement::Transport(format!("failed to send request: {err}")),
            Ok(Ok(())) => read_settlement(&mut child, &request.id, deadline, partial_logs).await,
        };
        teardown(child, &request.id).await;
        settlement
    }

    fn spawn_worker(&self) -> std::io::Result<Child> {
        Command::new(&self.config.worker_path)
            .env_clear()
            .env(ENV_SANDBOX_LOG, &self.config.worker_log)
            .current_dir(std::env::temp_dir())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
    }
}

/// Instruments on a blocking thread with a script-sized stack.
async fn instrument_source(code: String) -> Result<String, String> {
    let joined = tokio::task::spawn_blocking(move || {
        runlab_script::with_script_stack(move || runlab_script::instrument(&code))
    })
    .await;
    match joined {
        Ok(Ok(Ok(instrumented))) => Ok(instrumented.code),
        Ok(Ok(Err(err))) => Err(err.to_string()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(err) => Err(err.to_string()),
    }
}

async fn write_request(child: &mut Child, request: &SandboxRequest) -> std::io::Result<()> {
    let payload = serde_json::to_vec(request).map_err(std::io::Error::other)?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("sandbox stdin unavailable"))?;
    stdin.write_all(&payload).await?;
    stdin.shutdown().await?;
    Ok(())
}

async fn read_settlement(
    child: &mut Child,
    id: &RequestId,
    deadline: tokio::time::Instant,
    partial_logs: &mut Vec<LogEntry>,
) -> Settlement {
    let Some(stdout) = child.stdout.take() else {
        return Settlement::Transport("sandbox stdout unavailable".to_string());
    };
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match tokio::time::timeout_at(deadline, lines.next_line()).await {
            Err(_) => return Settlement::Timeout,
            Ok(Err(err)) => return Settlement::Transport(format!("failed to read from sandbox: {err}")),
            Ok(Ok(None)) => return Settlement::Transport("sandbox exited without a result".to_string()),
            Ok(Ok(Some(line))) => line,
        };
        if line.trim().is_empty() {
            continue;
        }
        let message = match WorkerMessage::from_line(&line) {
            Ok(message) => message,
            Err(err) => return Settlement::Transport(format!("malformed sandbox message: {err}")),
        };
        if message.id() != id {
            warn!(expected = %id, got = %message.id(), "ignoring message for another request");
            continue;
        }
        match message {
            WorkerMessage::Log { entry, .. } => partial_logs.push(entry),
            WorkerMessage::Settled { response, .. } => return Settlement::Response(response),
        }
    }
}

/// Kills the worker if it is still running and reaps it.
async fn teardown(mut child: Child, id: &RequestId) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(id = %id, %status, "sandbox already exited");
            return;
        }
        Ok(None) => {}
        Err(err) => warn!(id = %id, "failed to poll sandbox: {}", err),
    }
    if let Err(err) = child.start_kill() {
        warn!(id = %id, "failed to kill sandbox: {}", err);
    }
    match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => debug!(id = %id, %status, "sandbox terminated"),
        Ok(Err(err)) => warn!(id = %id, "failed to reap sandbox: {}", err),
        Err(_) => warn!(id = %id, "sandbox did not exit after kill"),
    }
}
