//! Debug sessions.
//!
//! A session owns its breakpoints, the source and result of its last run and
//! a replay debugger; the coordinator never sees any of them. Each session
//! has its own single-flight handle, so a second run on the same session is
//! refused while the first is outstanding. Sessions nobody has looked up for
//! a while are dropped by [`SessionStore::start_idle_sweep`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use runlab_core::ExecutionResult;
use runlab_debug::{BreakpointSet, ReplayDebugger};
use runlab_sandbox::{Coordinator, SandboxConfig};
use uuid::Uuid;

/// Mutable per-session state, guarded by [`Session::workspace`].
#[derive(Debug, Default)]
pub struct Workspace {
    pub language: Option<String>,
    pub source: Option<String>,
    pub last_result: Option<ExecutionResult>,
    pub breakpoints: BreakpointSet,
    pub debugger: ReplayDebugger,
}

impl Workspace {
    /// Records a finished run and ends any active replay.
    pub fn record_run(&mut self, language: String, source: String, result: ExecutionResult) {
        self.debugger.stop();
        self.language = Some(language);
        self.source = Some(source);
        self.last_result = Some(result);
    }
}

pub struct Session {
    pub id: Uuid,
    pub coordinator: Coordinator,
    workspace: Mutex<Workspace>,
    last_active: Mutex<Instant>,
}

impl Session {
    fn new(config: SandboxConfig) -> Self {
        Session {
            id: Uuid::new_v4(),
            coordinator: Coordinator::new(config),
            workspace: Mutex::new(Workspace::default()),
            last_active: Mutex::new(Instant::now()),
        }
    }

    pub fn workspace(&self) -> MutexGuard<'_, Workspace> {
        self.workspace.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let last_active = *self.last_active.lock().unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(last_active)
    }
}

/// Concurrent map of live sessions.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<Uuid, Arc<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, config: SandboxConfig) -> Arc<Session> {
        let session = Arc::new(Session::new(config));
        self.sessions.insert(session.id, session.clone());
        tracing::info!(session = %session.id, "session created");
        session
    }

    /// Looks up a session and marks it active.
    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).map(|entry| entry.value().clone())?;
        session.touch();
        Some(session)
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes sessions idle longer than `timeout`. A session with a run in
    /// flight is kept.
    ///
    /// Returns the number of sessions removed.
    pub fn sweep_inactive(&self, timeout: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let keep = session.coordinator.is_busy() || session.idle_for(now) < timeout;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Sweeps idle sessions every `interval` on the current tokio runtime.
    pub fn start_idle_sweep(self: &Arc<Self>, timeout: Duration, interval: Duration) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                let removed = store.sweep_inactive(timeout);
                if removed > 0 {
                    tracing::info!("Swept {} idle session(s)", removed);
                }
            }
        });
    }
}
