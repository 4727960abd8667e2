use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::core::{StateMutation, Tuning};
use crate::platform::ProcessControl;

use super::WindowQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    ProcessExited,
    BudgetExhausted,
    Cancelled,
}

/// Running retry monitor. Dropping the handle leaves the monitor running
/// until the backend exits or its budget runs out.
pub struct MonitorHandle {
    pid: i32,
    task: JoinHandle<MonitorExit>,
    cancel: watch::Sender<bool>,
}

impl MonitorHandle {
    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> MonitorExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::warn!("[MONITOR] Task for pid {} aborted: {}", self.pid, e);
                MonitorExit::Cancelled
            }
        }
    }
}

/// Keeps re-applying the wallpaper flags for as long as the backend lives,
/// covering windows that appear late or get restacked.
pub struct RetryMonitor {
    query: Arc<WindowQuery>,
    processes: Arc<dyn ProcessControl>,
    tuning: Tuning,
}

impl RetryMonitor {
    pub fn new(query: Arc<WindowQuery>, processes: Arc<dyn ProcessControl>, tuning: Tuning) -> Self {
        Self {
            query,
            processes,
            tuning,
        }
    }

    /// Start monitoring `pid`. Returns `None` when flags were not requested.
    pub fn start(&self, pid: i32, requested: bool) -> Option<MonitorHandle> {
        if !requested {
            return None;
        }
        tracing::info!(
            "[MONITOR] Watching pid {} ({} ticks of {:?})",
            pid,
            self.tuning.monitor_iterations,
            self.tuning.monitor_tick()
        );

        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run(
            pid,
            self.query.clone(),
            self.processes.clone(),
            self.tuning.clone(),
            cancel_rx,
        ));
        Some(MonitorHandle { pid, task, cancel })
    }
}

async fn run(
    pid: i32,
    query: Arc<WindowQuery>,
    processes: Arc<dyn ProcessControl>,
    tuning: Tuning,
    mut cancel_rx: watch::Receiver<bool>,
) -> MonitorExit {
    let mut cancellable = true;
    for _ in 0..tuning.monitor_iterations {
        if *cancel_rx.borrow() {
            tracing::debug!("[MONITOR] Cancelled for pid {}", pid);
            return MonitorExit::Cancelled;
        }
        if !processes.is_alive(pid) {
            tracing::info!("[MONITOR] Backend pid {} exited, stopping retry monitor", pid);
            return MonitorExit::ProcessExited;
        }

        // Detached so a slow window tool never delays the next tick.
        tokio::spawn(reconcile(query.clone(), tuning.clone()));

        tokio::select! {
            _ = tokio::time::sleep(tuning.monitor_tick()) => {}
            changed = cancel_rx.changed(), if cancellable => {
                if changed.is_err() {
                    // Handle dropped; nobody can cancel any more.
                    cancellable = false;
                }
            }
        }
    }
    tracing::info!("[MONITOR] Budget exhausted for pid {}", pid);
    MonitorExit::BudgetExhausted
}

async fn reconcile(query: Arc<WindowQuery>, tuning: Tuning) {
    let windows = query.list_matching().await;
    let mut attempts = JoinSet::new();
    for window in windows.iter() {
        for mutation in StateMutation::WALLPAPER_SEQUENCE {
            let query = query.clone();
            let id = window.id;
            let timeout = tuning.monitor_mutation_timeout();
            attempts.spawn(async move {
                tokio::time::timeout(timeout, query.set_state(id, mutation))
                    .await
                    .unwrap_or(false)
            });
        }
    }
    while attempts.join_next().await.is_some() {}
}
