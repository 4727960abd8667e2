use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use lwe_ipc::{EngineState, LoopConfig};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::app::{ApplyOutcome, Orchestrator};
use crate::core::{Lifecycle, Tuning, WindowSet};
use crate::launcher::{is_backend_command, BACKEND_PROCESS_PATTERN};
use crate::pid::PidFile;
use crate::platform::{ProcessControl, ProcessSignal};
use crate::state::StateStore;
use crate::window::{FlagApplier, WindowQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    NotRunning,
    /// Exited after SIGTERM.
    Graceful,
    /// Needed SIGKILL.
    Forced,
    /// Still alive after SIGKILL.
    Stalled,
}

async fn wait_for_exit(processes: &dyn ProcessControl, pid: i32, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    let step = (grace / 10).max(Duration::from_millis(1));
    loop {
        if !processes.is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(step).await;
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL.
pub async fn terminate(
    processes: &dyn ProcessControl,
    pid: i32,
    grace: Duration,
) -> TerminationOutcome {
    if !processes.is_alive(pid) {
        return TerminationOutcome::NotRunning;
    }

    if let Err(e) = processes.signal(pid, ProcessSignal::Terminate) {
        tracing::warn!("[STOP] {:#}", e);
    }
    if wait_for_exit(processes, pid, grace).await {
        tracing::info!("[STOP] Backend pid {} exited", pid);
        return TerminationOutcome::Graceful;
    }

    tracing::warn!("[STOP] Backend pid {} ignored SIGTERM, killing", pid);
    if let Err(e) = processes.signal(pid, ProcessSignal::Kill) {
        tracing::warn!("[STOP] {:#}", e);
    }
    if wait_for_exit(processes, pid, grace).await {
        TerminationOutcome::Forced
    } else {
        TerminationOutcome::Stalled
    }
}

/// Like [`terminate`], for a pid read back from disk: it is only signalled
/// while it still runs the backend, since the pid may have been reused.
pub async fn terminate_backend(
    processes: &dyn ProcessControl,
    pid: i32,
    grace: Duration,
) -> TerminationOutcome {
    if !processes.is_alive(pid) {
        return TerminationOutcome::NotRunning;
    }
    if !processes
        .command_line(pid)
        .is_some_and(|argv| is_backend_command(&argv))
    {
        tracing::warn!("[STOP] pid {} is no longer a backend, leaving it alone", pid);
        return TerminationOutcome::NotRunning;
    }
    terminate(processes, pid, grace).await
}

/// File name of the running executable; loop owners run the same binary.
fn own_program() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "lwe".to_string())
}

/// Persisted state plus what is actually running right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub state: EngineState,
    pub backend_alive: bool,
    /// Loop owner pid and whether it is alive.
    pub loop_owner: Option<(i32, bool)>,
}

/// Owns stop semantics and the wallpaper loop.
pub struct Supervisor {
    query: Arc<WindowQuery>,
    flags: FlagApplier,
    processes: Arc<dyn ProcessControl>,
    store: StateStore,
    pid_file: PidFile,
    tuning: Tuning,
    sandboxed: bool,
    owner_program: String,
}

impl Supervisor {
    pub fn new(
        query: Arc<WindowQuery>,
        processes: Arc<dyn ProcessControl>,
        store: StateStore,
        pid_file: PidFile,
        tuning: Tuning,
        sandboxed: bool,
    ) -> Self {
        Self {
            flags: FlagApplier::new(query.clone()),
            query,
            processes,
            store,
            pid_file,
            tuning,
            sandboxed,
            owner_program: own_program(),
        }
    }

    fn is_loop_owner(&self, pid: i32) -> bool {
        self.processes
            .command_line(pid)
            .and_then(|argv| argv.into_iter().next())
            .is_some_and(|program| {
                std::path::Path::new(&program)
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy() == self.owner_program)
            })
    }

    /// Stop the loop owner, close every backend window, kill the backend
    /// and clear persisted state. Safe to call when nothing is running.
    pub async fn stop_all(&self) -> TerminationOutcome {
        let own_pid = std::process::id() as i32;
        let owner = self.pid_file.read();
        if let Err(e) = self.pid_file.remove() {
            tracing::warn!("[STOP] {:#}", e);
        }
        if let Some(owner) = owner.filter(|pid| *pid != own_pid) {
            if !self.processes.is_alive(owner) {
                tracing::debug!("[STOP] Loop owner pid {} already gone", owner);
            } else if !self.is_loop_owner(owner) {
                tracing::warn!("[STOP] pid {} is no longer a loop owner, leaving it alone", owner);
            } else {
                tracing::info!("[STOP] Signalling loop owner pid {}", owner);
                if let Err(e) = self.processes.signal(owner, ProcessSignal::Terminate) {
                    tracing::warn!("[STOP] {:#}", e);
                }
            }
        }

        let state = self.store.load();
        let mut windows = self.query.list_matching().await;
        if windows.is_empty() {
            windows = WindowSet::from_tokens(&state.last_windows);
        }
        if !windows.is_empty() {
            self.flags.close_all(&windows, None).await;
            tokio::time::sleep(self.tuning.close_wait()).await;
        }

        let mut outcome = match state.last_pid {
            Some(pid) => {
                terminate_backend(self.processes.as_ref(), pid, self.tuning.termination_grace())
                    .await
            }
            None => TerminationOutcome::NotRunning,
        };

        if self.processes.kill_matching(BACKEND_PROCESS_PATTERN).await {
            tracing::info!("[STOP] Killed stray backend processes");
        }
        if outcome == TerminationOutcome::Stalled {
            match state.last_pid {
                Some(pid) if !self.processes.is_alive(pid) => outcome = TerminationOutcome::Forced,
                Some(pid) => tracing::error!("[STOP] Backend pid {} survived SIGKILL", pid),
                None => {}
            }
        }

        let cleared = EngineState {
            last_execution_time: Some(Utc::now()),
            sandboxed: self.sandboxed,
            ..Default::default()
        };
        if let Err(e) = self.store.save(&cleared) {
            tracing::warn!("[STOP] {:#}", e);
        }

        tracing::info!("[STOP] Done ({:?})", outcome);
        outcome
    }

    pub fn status(&self) -> StatusReport {
        let state = self.store.load();
        let backend_alive = state
            .last_pid
            .is_some_and(|pid| self.processes.is_alive(pid));
        let loop_owner = self
            .pid_file
            .read()
            .map(|pid| (pid, self.processes.is_alive(pid)));
        StatusReport {
            state,
            backend_alive,
            loop_owner,
        }
    }

    /// Apply a random wallpaper every `delay_seconds` until `shutdown` fires,
    /// the pid file is removed, or `max_iterations` is reached.
    pub async fn run_loop(
        &self,
        orchestrator: &Orchestrator,
        config: &LoopConfig,
        max_iterations: Option<u32>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let own_pid = std::process::id() as i32;
        self.pid_file.write(own_pid)?;
        tracing::info!(
            "[LOOP] Owner pid {}, every {}s, pool of {}",
            own_pid,
            config.delay_seconds,
            config.pool.len()
        );

        let delay = Duration::from_secs(config.delay_seconds);
        let mut current: Option<ApplyOutcome> = None;
        let mut iteration = 0u32;
        let result = loop {
            if max_iterations.is_some_and(|max| iteration >= max) {
                break Ok(());
            }
            if self.should_stop(own_pid, &shutdown) {
                break Ok(());
            }
            iteration += 1;

            let Some(wallpaper) = orchestrator.pick(&config.pool) else {
                tracing::warn!("[LOOP] No wallpapers to choose from");
                if self.wait_or_stop(delay, own_pid, &mut shutdown).await {
                    break Ok(());
                }
                continue;
            };

            match orchestrator.apply(&wallpaper).await {
                Ok(outcome) => {
                    tracing::info!("[LOOP] Iteration {}: pid {}", iteration, outcome.engine.pid);
                    if let Some(previous) = current.replace(outcome) {
                        if let Some(monitor) = previous.monitor {
                            monitor.cancel();
                        }
                    }
                }
                Err(e) => break Err(e.into()),
            }

            if self.wait_or_stop(delay, own_pid, &mut shutdown).await {
                break Ok(());
            }
        };

        self.cleanup_loop(own_pid, current).await;
        result
    }

    async fn cleanup_loop(&self, own_pid: i32, current: Option<ApplyOutcome>) {
        if let Some(outcome) = current {
            if let Some(monitor) = outcome.monitor {
                monitor.cancel();
            }
            let pid = outcome.engine.pid;
            let result = terminate(self.processes.as_ref(), pid, self.tuning.termination_grace()).await;
            tracing::info!(
                "[LOOP] Backend pid {} {:?} ({:?})",
                pid,
                Lifecycle::Terminated,
                result
            );

            // A stop may have cleared the state while this backend was
            // starting. A loop that took over owns the state and keeps it.
            if self.store.load().last_pid == Some(pid) {
                let cleared = EngineState {
                    last_execution_time: Some(Utc::now()),
                    sandboxed: self.sandboxed,
                    ..Default::default()
                };
                if let Err(e) = self.store.save(&cleared) {
                    tracing::warn!("[LOOP] {:#}", e);
                }
            }
        }
        if self.pid_file.is_owned_by(own_pid) {
            if let Err(e) = self.pid_file.remove() {
                tracing::warn!("[LOOP] {:#}", e);
            }
        }
    }

    fn should_stop(&self, own_pid: i32, shutdown: &watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            tracing::info!("[LOOP] Shutdown requested");
            return true;
        }
        if !self.pid_file.is_owned_by(own_pid) {
            tracing::info!("[LOOP] Pid file removed, stopping");
            return true;
        }
        false
    }

    /// Sleep for `delay`. Returns true if the loop should stop instead.
    async fn wait_or_stop(
        &self,
        delay: Duration,
        own_pid: i32,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let deadline = Instant::now() + delay;
        let mut listening = true;
        loop {
            if self.should_stop(own_pid, shutdown) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let step = (deadline - now).min(self.tuning.monitor_tick());
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                changed = shutdown.changed(), if listening => {
                    if changed.is_err() {
                        listening = false;
                    }
                }
            }
        }
    }
}
