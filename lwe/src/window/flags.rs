use std::sync::Arc;

use crate::core::{StateMutation, WindowHandle, WindowId, WindowSet};

use super::WindowQuery;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagOutcome {
    /// Every mutation in the wallpaper sequence took effect.
    Applied,
    /// Flags were not requested; the window was left untouched.
    Skipped,
    /// At least one mutation failed on both strategies.
    Failed { failed: Vec<StateMutation> },
}

/// Turns a backend window into a wallpaper: not above, hidden from
/// switchers, kept below everything else.
pub struct FlagApplier {
    query: Arc<WindowQuery>,
}

impl FlagApplier {
    pub fn new(query: Arc<WindowQuery>) -> Self {
        Self { query }
    }

    /// Apply the wallpaper flags. If a mutation is rejected, activate the
    /// window and try once more. Focus then goes back to `previous_focus`,
    /// since the new window may have taken it on its own.
    pub async fn apply(
        &self,
        window: &WindowHandle,
        requested: bool,
        previous_focus: Option<WindowId>,
    ) -> FlagOutcome {
        if !requested {
            tracing::debug!("[FLAGS] Leaving window {} stacking unchanged", window);
            return FlagOutcome::Skipped;
        }

        let mut failed = Vec::new();
        let mut activated = false;
        for mutation in StateMutation::WALLPAPER_SEQUENCE {
            if self.query.set_state(window.id, mutation).await {
                continue;
            }
            if !activated {
                activated = self.query.activate(window.id).await;
            }
            if activated && self.query.set_state(window.id, mutation).await {
                tracing::debug!("[FLAGS] {} on {} succeeded after activation", mutation, window);
                continue;
            }
            failed.push(mutation);
        }

        if let Some(previous) = previous_focus.filter(|id| *id != window.id) {
            if !self.query.activate(previous).await {
                tracing::debug!("[FLAGS] Could not restore focus to {:#x}", previous);
            }
        }

        if failed.is_empty() {
            tracing::info!("[FLAGS] Window {} flagged as wallpaper", window);
            FlagOutcome::Applied
        } else {
            let applied: Vec<String> = StateMutation::WALLPAPER_SEQUENCE
                .iter()
                .filter(|m| !failed.contains(*m))
                .map(|m| m.to_string())
                .collect();
            tracing::warn!(
                "[FLAGS] Flags on {} failed: {:?} (applied: {:?})",
                window,
                failed.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
                applied
            );
            FlagOutcome::Failed { failed }
        }
    }

    /// Close every window in `windows` except `keep`. Returns how many closed.
    pub async fn close_all(&self, windows: &WindowSet, keep: Option<WindowId>) -> usize {
        let mut closed = 0;
        for window in windows.iter().filter(|w| Some(w.id) != keep) {
            if self.query.close(window).await {
                tracing::info!("[FLAGS] Closed backend window {}", window);
                closed += 1;
            } else {
                tracing::warn!("[FLAGS] Failed to close backend window {}", window);
            }
        }
        closed
    }
}
