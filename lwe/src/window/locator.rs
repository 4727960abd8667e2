use std::sync::Arc;

use tokio::time::Instant;

use crate::core::{Tuning, WindowHandle, WindowSet};

use super::{Listing, WindowQuery};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateOutcome {
    Found(WindowHandle),
    TimedOut,
    /// Window tools kept failing; the search was abandoned early.
    QueryUnavailable,
}

impl LocateOutcome {
    pub fn window(&self) -> Option<&WindowHandle> {
        match self {
            LocateOutcome::Found(window) => Some(window),
            _ => None,
        }
    }
}

/// Polls for a backend window that was not present before launch.
pub struct WindowLocator {
    query: Arc<WindowQuery>,
    tuning: Tuning,
}

impl WindowLocator {
    pub fn new(query: Arc<WindowQuery>, tuning: Tuning) -> Self {
        Self { query, tuning }
    }

    /// Never runs past the poll budget, however slow the tools are. The
    /// degraded grace period counts against the same budget.
    pub async fn wait_for_new_window(&self, old: &WindowSet) -> LocateOutcome {
        let budget = self.tuning.locate_budget();
        let started = Instant::now();
        let outcome =
            match tokio::time::timeout(budget, self.poll(old)).await {
                Ok(outcome) => outcome,
                Err(_) => LocateOutcome::TimedOut,
            };

        match &outcome {
            LocateOutcome::Found(window) => {
                tracing::info!("[LOCATE] Found backend window {}", window)
            }
            LocateOutcome::TimedOut => tracing::warn!(
                "[LOCATE] No new backend window after {:?}",
                self.tuning.locate_budget()
            ),
            LocateOutcome::QueryUnavailable => {
                let grace = self
                    .tuning
                    .degraded_grace()
                    .min(budget.saturating_sub(started.elapsed()));
                tracing::warn!(
                    "[LOCATE] Window tools unavailable, giving the backend {:?} to start",
                    grace
                );
                tokio::time::sleep(grace).await;
            }
        }
        outcome
    }

    async fn poll(&self, old: &WindowSet) -> LocateOutcome {
        let mut consecutive_failures = 0;
        for _ in 0..self.tuning.poll_budget {
            match self.query.listing().await {
                Listing::Windows(current) => {
                    consecutive_failures = 0;
                    if let Some(window) = current.difference(old).first() {
                        return LocateOutcome::Found(window.clone());
                    }
                }
                Listing::Unavailable => {
                    consecutive_failures += 1;
                    if consecutive_failures >= self.tuning.query_failure_threshold {
                        return LocateOutcome::QueryUnavailable;
                    }
                }
            }
            tokio::time::sleep(self.tuning.poll_interval()).await;
        }
        LocateOutcome::TimedOut
    }
}
