use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use lwe_ipc::{EngineState, LaunchRequest};

use crate::core::{EngineProcess, Lifecycle, Tuning, WindowHandle, WindowSet};
use crate::error::LaunchError;
use crate::launcher::{BackendResolver, EngineLauncher};
use crate::platform::ProcessControl;
use crate::selection;
use crate::state::StateStore;
use crate::supervisor::terminate_backend;
use crate::window::{
    FlagApplier, FlagOutcome, MonitorHandle, RetryMonitor, WindowLocator,
    WindowQuery,
};

/// What one apply produced.
pub struct ApplyOutcome {
    pub engine: EngineProcess,
    pub window: Option<WindowHandle>,
    pub flags: Option<FlagOutcome>,
    pub monitor: Option<MonitorHandle>,
    pub lifecycle: Lifecycle,
}

fn advance(pid: i32, current: &mut Lifecycle, next: Lifecycle) {
    if !current.can_transition_to(next) {
        tracing::warn!("[APPLY] pid {}: unexpected {:?} -> {:?}", pid, current, next);
    }
    tracing::debug!("[APPLY] pid {}: {:?} -> {:?}", pid, current, next);
    *current = next;
}

/// Runs the apply pipeline: snapshot old windows, launch, locate the new
/// window, flag it, persist, then retire the previous backend.
pub struct Orchestrator {
    request: LaunchRequest,
    query: Arc<WindowQuery>,
    processes: Arc<dyn ProcessControl>,
    launcher: EngineLauncher,
    locator: WindowLocator,
    flags: FlagApplier,
    monitor: RetryMonitor,
    store: StateStore,
    tuning: Tuning,
    sandboxed: bool,
}

impl Orchestrator {
    pub fn new(
        request: LaunchRequest,
        query: Arc<WindowQuery>,
        processes: Arc<dyn ProcessControl>,
        resolver: BackendResolver,
        store: StateStore,
        tuning: Tuning,
        sandboxed: bool,
    ) -> Self {
        Self {
            launcher: EngineLauncher::new(resolver, processes.clone()),
            locator: WindowLocator::new(query.clone(), tuning.clone()),
            flags: FlagApplier::new(query.clone()),
            monitor: RetryMonitor::new(query.clone(), processes.clone(), tuning.clone()),
            request,
            query,
            processes,
            store,
            tuning,
            sandboxed,
        }
    }

    pub fn request(&self) -> &LaunchRequest {
        &self.request
    }

    pub async fn apply(&self, wallpaper: &Path) -> Result<ApplyOutcome, LaunchError> {
        let previous = self.store.load();

        // Must be captured before the spawn.
        let mut old = self.query.list_matching().await;
        if old.is_empty() && !previous.last_windows.is_empty() {
            tracing::info!(
                "[APPLY] No windows listed, using {} persisted window(s)",
                previous.last_windows.len()
            );
            old = WindowSet::from_tokens(&previous.last_windows);
        }
        let previous_focus = if self.request.above {
            self.query.active_window().await
        } else {
            None
        };

        let engine = self.launcher.launch(&self.request, wallpaper).await?;
        let pid = engine.pid;
        let mut lifecycle = Lifecycle::Launching;

        let monitor = self.monitor.start(pid, self.request.above);

        advance(pid, &mut lifecycle, Lifecycle::WindowPending);
        let located = self.locator.wait_for_new_window(&old).await;

        let (window, flags) = match located.window() {
            Some(window) => {
                let flags = self
                    .flags
                    .apply(window, self.request.above, previous_focus)
                    .await;
                advance(pid, &mut lifecycle, Lifecycle::WindowFlagged);
                (Some(window.clone()), Some(flags))
            }
            None => {
                tracing::warn!(
                    "[APPLY] Window for pid {} not detected ({:?}), tracking the process only",
                    pid,
                    located
                );
                advance(pid, &mut lifecycle, Lifecycle::WindowUndetected);
                (None, None)
            }
        };

        let state = EngineState {
            last_pid: Some(pid),
            last_windows: window.iter().map(WindowHandle::token).collect(),
            last_wallpaper: wallpaper.display().to_string(),
            last_execution_time: Some(Utc::now()),
            sandboxed: self.sandboxed,
        };
        if let Err(e) = self.store.save(&state) {
            tracing::warn!("[APPLY] {:#}", e);
        }

        self.retire_previous(&old, window.as_ref(), previous.last_pid, pid)
            .await;

        Ok(ApplyOutcome {
            engine,
            window,
            flags,
            monitor,
            lifecycle,
        })
    }

    /// Close the old windows, then make sure the previous backend is gone.
    async fn retire_previous(
        &self,
        old: &WindowSet,
        new_window: Option<&WindowHandle>,
        previous_pid: Option<i32>,
        new_pid: i32,
    ) {
        let keep = new_window.map(|w| w.id);
        if !old.is_empty() {
            let closed = self.flags.close_all(old, keep).await;
            tracing::info!("[APPLY] Closed {} of {} old window(s)", closed, old.len());
        }

        let Some(previous) = previous_pid.filter(|pid| *pid != new_pid) else {
            return;
        };
        let mut lifecycle = Lifecycle::Transitioning;
        let outcome = terminate_backend(
            self.processes.as_ref(),
            previous,
            self.tuning.termination_grace(),
        )
        .await;
        advance(previous, &mut lifecycle, Lifecycle::Terminated);
        tracing::info!("[APPLY] Previous backend pid {}: {:?}", previous, outcome);
    }

    /// A uniformly random wallpaper from `pool`, or from the directory when
    /// the pool is empty.
    pub fn pick(&self, pool: &[String]) -> Option<PathBuf> {
        let directory = self.request.directory.as_deref();
        let candidates = selection::candidates(pool, directory);
        let mut rng = rand::thread_rng();
        selection::choose(&candidates, &mut rng)
            .map(|entry| selection::resolve_wallpaper(entry, directory))
    }

    pub async fn apply_random(&self) -> Result<Option<ApplyOutcome>, LaunchError> {
        let Some(wallpaper) = self.pick(&self.request.pool) else {
            tracing::warn!("[APPLY] No wallpapers to choose from");
            return Ok(None);
        };
        tracing::info!("[APPLY] Random pick: {}", wallpaper.display());
        self.apply(&wallpaper).await.map(Some)
    }

    /// Wallpaper names under `--dir`. Nothing to list is not an error.
    pub fn list(&self) -> Vec<String> {
        let Some(directory) = self.request.directory.as_deref() else {
            tracing::warn!("[APPLY] list needs --dir");
            return Vec::new();
        };
        selection::list_wallpapers(directory).unwrap_or_else(|e| {
            tracing::warn!("[APPLY] {:#}", e);
            Vec::new()
        })
    }

    pub fn resolve(&self, entry: &str) -> PathBuf {
        selection::resolve_wallpaper(entry, self.request.directory.as_deref())
    }
}
