//! runlab command-line runner.
//!
//! Provides the `runlab` binary. `run` executes a script file in a fresh
//! sandbox and prints its console output and result; `debug` runs it
//! instrumented and walks the recorded states with the replay debugger.
//!
//! Runs go through the same [`Coordinator`] the HTTP server uses, so the
//! timeout, isolation and settlement behavior is identical from both entry
//! points.

mod report;

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use runlab_core::{ExecutionRequest, ExecutionResult};
use runlab_debug::{BreakpointSet, ContinueStop, ReplayDebugger, ReplayMode};
use runlab_sandbox::{Coordinator, SandboxConfig};

/// Sandboxed script runner and replay debugger.
#[derive(Parser)]
#[command(name = "runlab", about = "Sandboxed script runner and replay debugger")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Sandbox settings shared by every subcommand. Flags override the
/// `RUNLAB_*` environment.
#[derive(Args)]
struct SandboxArgs {
    /// Language label of the script.
    #[arg(short, long, default_value = "javascript")]
    language: String,

    /// Timeout budget in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Path to the `runlab-sandbox` worker binary.
    #[arg(long)]
    sandbox: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script and print its output.
    Run {
        /// Script file.
        file: PathBuf,

        #[command(flatten)]
        sandbox: SandboxArgs,

        /// Record a trace timeline.
        #[arg(long)]
        instrument: bool,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Replay a script's execution, stopping at breakpoints.
    Debug {
        /// Script file.
        file: PathBuf,

        #[command(flatten)]
        sandbox: SandboxArgs,

        /// Breakpoint line (repeatable). Without any, every state is printed.
        #[arg(short = 'b', long = "break")]
        breakpoints: Vec<u32>,

        /// Skip execution and reconstruct states from the source text.
        #[arg(long)]
        heuristic: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Run {
            file,
            sandbox,
            instrument,
            json,
        } => run_script(&file, &sandbox, instrument, json),
        Commands::Debug {
            file,
            sandbox,
            breakpoints,
            heuristic,
        } => debug_script(&file, &sandbox, breakpoints, heuristic),
    };
    process::exit(exit_code);
}

/// Exit code for local failures before or around a run: unreadable file,
/// bad configuration, no async runtime.
const EXIT_IO: i32 = 4;

fn load_config(args: &SandboxArgs) -> Result<SandboxConfig, String> {
    let mut config = SandboxConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(ms) = args.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    if let Some(path) = &args.sandbox {
        config.worker_path = path.clone();
    }
    debug!(
        worker = %config.worker_path.display(),
        timeout_ms = config.timeout_ms(),
        "sandbox configured"
    );
    Ok(config)
}

/// Reads the script and settles one run of it.
fn execute(file: &Path, args: &SandboxArgs, instrument: bool) -> Result<(String, ExecutionResult), String> {
    let source = std::fs::read_to_string(file)
        .map_err(|e| format!("failed to read '{}': {}", file.display(), e))?;
    let config = load_config(args)?;
    let runtime = tokio::runtime::Runtime::new().map_err(|e| format!("failed to start runtime: {}", e))?;

    let coordinator = Coordinator::new(config);
    let request = ExecutionRequest::new(source.clone(), args.language.clone(), instrument);
    let result = runtime
        .block_on(coordinator.submit(request))
        .map_err(|e| e.to_string())?;
    debug!(
        id = %result.id,
        status = result.status.label(),
        duration_ms = result.duration_ms,
        "run settled"
    );
    Ok((source, result))
}

/// Execute the run subcommand.
///
/// Returns exit code: 0 = success, 1 = runtime exception, 2 = timeout,
/// 3 = unsupported language, instrumentation or transport failure,
/// 4 = I/O error.
fn run_script(file: &Path, args: &SandboxArgs, instrument: bool, json: bool) -> i32 {
    let result = match execute(file, args, instrument) {
        Ok((_, result)) => result,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return EXIT_IO;
        }
    };

    if json {
        let json = serde_json::to_string_pretty(&result)
            .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
        println!("{}", json);
    } else {
        for line in report::result_lines(&result) {
            println!("{}", line);
        }
    }
    report::exit_code(result.status)
}

/// Execute the debug subcommand. Exit codes as for `run`; a run that
/// leaves nothing to replay exits with 1.
fn debug_script(file: &Path, args: &SandboxArgs, breakpoints: Vec<u32>, heuristic: bool) -> i32 {
    let mut debugger = ReplayDebugger::new();
    let (started, run_code) = if heuristic {
        let source = match std::fs::read_to_string(file) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Error: failed to read '{}': {}", file.display(), e);
                return EXIT_IO;
            }
        };
        (debugger.start_heuristic(&source), 0)
    } else {
        let (source, result) = match execute(file, args, true) {
            Ok(run) => run,
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return EXIT_IO;
            }
        };
        for line in report::result_lines(&result) {
            println!("{}", line);
        }
        (
            debugger.start(result.timeline.as_ref(), &source),
            report::exit_code(result.status),
        )
    };

    if let Ok(mode) = &started {
        debug!(?mode, states = debugger.len(), "replay started");
    }
    match started {
        Ok(ReplayMode::Heuristic) => println!("{}", runlab_debug::HEURISTIC_NOTICE),
        Ok(ReplayMode::Runtime) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    let breakpoints: BreakpointSet = breakpoints.into_iter().collect();
    for index in visited_states(&mut debugger, &breakpoints) {
        if let Some(state) = debugger.states().get(index) {
            for line in report::state_lines(index, debugger.len(), state) {
                println!("{}", line);
            }
        }
    }
    run_code
}

/// Indices the debugger stops at: every state without breakpoints,
/// otherwise the first state and each breakpoint hit in order.
fn visited_states(debugger: &mut ReplayDebugger, breakpoints: &BreakpointSet) -> Vec<usize> {
    if breakpoints.is_empty() {
        return (0..debugger.len()).collect();
    }
    let mut visited: Vec<usize> = debugger.index().into_iter().collect();
    while let Ok(ContinueStop::Breakpoint { index, .. }) = debugger.continue_to_breakpoint(breakpoints) {
        visited.push(index);
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn visits_every_state_without_breakpoints() {
        let mut debugger = ReplayDebugger::new();
        debugger.start_heuristic("let a = 1;\nlet b = 2;\nlet c = 3;").unwrap();
        assert_eq!(visited_states(&mut debugger, &BreakpointSet::default()), vec![0, 1, 2]);
    }

    #[test]
    fn stops_at_each_breakpoint_hit() {
        let mut debugger = ReplayDebugger::new();
        debugger
            .start_heuristic("let a = 1;\nlet b = 2;\nlet c = 3;\nlet d = 4;")
            .unwrap();
        let breakpoints: BreakpointSet = [2, 4].into_iter().collect();
        assert_eq!(visited_states(&mut debugger, &breakpoints), vec![0, 1, 3]);
    }

    #[test]
    fn cli_parses_repeated_breakpoints() {
        let cli = Cli::try_parse_from(["runlab", "debug", "app.js", "-b", "3", "--break", "7"]).unwrap();
        match cli.command {
            Commands::Debug { breakpoints, heuristic, sandbox, .. } => {
                assert_eq!(breakpoints, vec![3, 7]);
                assert!(!heuristic);
                assert_eq!(sandbox.language, "javascript");
            }
            Commands::Run { .. } => panic!("expected debug"),
        }
    }

    #[test]
    fn flags_override_timeout_and_worker() {
        let args = SandboxArgs {
            language: "javascript".into(),
            timeout_ms: Some(250),
            sandbox: Some(PathBuf::from("/opt/runlab-sandbox")),
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.timeout_ms(), 250);
        assert_eq!(config.worker_path, PathBuf::from("/opt/runlab-sandbox"));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn config_loading_is_traced() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let args = SandboxArgs {
            language: "javascript".into(),
            timeout_ms: Some(250),
            sandbox: Some(PathBuf::from("/opt/runlab-sandbox")),
        };

        tracing::subscriber::with_default(subscriber, || load_config(&args)).unwrap();

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("sandbox configured"), "{output}");
        assert!(output.contains("worker=/opt/runlab-sandbox"), "{output}");
        assert!(output.contains("timeout_ms=250"), "{output}");
    }
}
