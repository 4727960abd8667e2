use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// A spawned backend process. Owned by the supervisor until terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineProcess {
    pub pid: i32,
    pub launch_args: Vec<String>,
    pub wallpaper: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// Lifecycle of a single backend process as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Launching,
    WindowPending,
    WindowFlagged,
    WindowUndetected,
    Transitioning,
    Terminated,
}

impl Lifecycle {
    pub fn can_transition_to(self, next: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (self, next),
            (Launching, WindowPending)
                | (WindowPending, WindowFlagged)
                | (WindowPending, WindowUndetected)
                | (WindowFlagged, Transitioning)
                | (WindowUndetected, Transitioning)
                | (Transitioning, Terminated)
                | (_, Terminated)
        )
    }
}
