//! Coordinator configuration.
//!
//! Read from `RUNLAB_*` environment variables at start-up; every value has
//! a default, and a malformed number is an error rather than being ignored.

use std::path::PathBuf;
use std::time::Duration;

use runlab_core::SandboxLimits;

use crate::error::SandboxConfigError;

pub const ENV_TIMEOUT_MS: &str = "RUNLAB_TIMEOUT_MS";
pub const ENV_SANDBOX_BIN: &str = "RUNLAB_SANDBOX_BIN";
pub const ENV_MAX_LOG_ENTRIES: &str = "RUNLAB_MAX_LOG_ENTRIES";
pub const ENV_MAX_TRACE_EVENTS: &str = "RUNLAB_MAX_TRACE_EVENTS";
pub const ENV_MAX_CALL_DEPTH: &str = "RUNLAB_MAX_CALL_DEPTH";
pub const ENV_MAX_ARRAY_LENGTH: &str = "RUNLAB_MAX_ARRAY_LENGTH";
pub const ENV_MAX_STRING_LENGTH: &str = "RUNLAB_MAX_STRING_LENGTH";
/// Tracing filter handed to the worker process (its only inherited variable).
pub const ENV_SANDBOX_LOG: &str = "RUNLAB_SANDBOX_LOG";

/// Default budget for one run.
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Name of the worker executable.
pub const WORKER_BIN: &str = "runlab-sandbox";

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    /// Hard budget from dispatch to settlement.
    pub timeout: Duration,
    /// Path of the `runlab-sandbox` worker binary.
    pub worker_path: PathBuf,
    pub limits: SandboxLimits,
    /// `EnvFilter` directive for the worker's stderr logging.
    pub worker_log: String,
}

impl SandboxConfig {
    /// Configuration with defaults and an explicit worker path.
    pub fn new(worker_path: impl Into<PathBuf>) -> Self {
        SandboxConfig {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            worker_path: worker_path.into(),
            limits: SandboxLimits::default(),
            worker_log: "warn".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self, SandboxConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SandboxConfigError> {
        let worker_path = match lookup(ENV_SANDBOX_BIN) {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => default_worker_path()?,
        };
        let mut config = SandboxConfig::new(worker_path);

        if let Some(ms) = parse_var(&lookup, ENV_TIMEOUT_MS)? {
            config.timeout = Duration::from_millis(ms as u64);
        }
        if let Some(n) = parse_var(&lookup, ENV_MAX_LOG_ENTRIES)? {
            config.limits.max_log_entries = n;
        }
        if let Some(n) = parse_var(&lookup, ENV_MAX_TRACE_EVENTS)? {
            config.limits.max_trace_events = n;
        }
        if let Some(n) = parse_var(&lookup, ENV_MAX_CALL_DEPTH)? {
            config.limits.max_call_depth = n;
        }
        if let Some(n) = parse_var(&lookup, ENV_MAX_ARRAY_LENGTH)? {
            config.limits.max_array_length = n;
        }
        if let Some(n) = parse_var(&lookup, ENV_MAX_STRING_LENGTH)? {
            config.limits.max_string_length = n;
        }
        if let Some(filter) = lookup(ENV_SANDBOX_LOG).filter(|f| !f.trim().is_empty()) {
            config.worker_log = filter;
        }
        Ok(config)
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<usize>, SandboxConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(SandboxConfigError::InvalidNumber { var, value: raw }),
    }
}

/// `runlab-sandbox` next to the running executable.
pub fn default_worker_path() -> Result<PathBuf, SandboxConfigError> {
    let exe = std::env::current_exe().map_err(SandboxConfigError::WorkerPath)?;
    Ok(exe.with_file_name(format!("{WORKER_BIN}{}", std::env::consts::EXE_SUFFIX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_variables() {
        let config = SandboxConfig::from_lookup(lookup(&[(ENV_SANDBOX_BIN, "/opt/worker")])).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(3000));
        assert_eq!(config.worker_path, PathBuf::from("/opt/worker"));
        assert_eq!(config.limits, SandboxLimits::default());
        assert_eq!(config.worker_log, "warn");
    }

    #[test]
    fn variables_override_defaults() {
        let config = SandboxConfig::from_lookup(lookup(&[
            (ENV_SANDBOX_BIN, "/opt/worker"),
            (ENV_TIMEOUT_MS, "500"),
            (ENV_MAX_LOG_ENTRIES, "10"),
            (ENV_MAX_CALL_DEPTH, " 64 "),
            (ENV_SANDBOX_LOG, "debug"),
        ]))
        .unwrap();
        assert_eq!(config.timeout_ms(), 500);
        assert_eq!(config.limits.max_log_entries, 10);
        assert_eq!(config.limits.max_call_depth, 64);
        assert_eq!(config.limits.max_trace_events, 10_000);
        assert_eq!(config.worker_log, "debug");
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = SandboxConfig::from_lookup(lookup(&[
            (ENV_SANDBOX_BIN, "/opt/worker"),
            (ENV_TIMEOUT_MS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, SandboxConfigError::InvalidNumber { var: ENV_TIMEOUT_MS, .. }));

        let err = SandboxConfig::from_lookup(lookup(&[
            (ENV_SANDBOX_BIN, "/opt/worker"),
            (ENV_MAX_TRACE_EVENTS, "0"),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "RUNLAB_MAX_TRACE_EVENTS must be a positive integer, got \"0\"");
    }

    #[test]
    fn default_worker_sits_next_to_the_executable() {
        let path = default_worker_path().unwrap();
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(WORKER_BIN)));
    }
}
