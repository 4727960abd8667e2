use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Timing knobs for polling, retries and termination.
/// Every value is a default tuned by hand, not a hard contract.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub poll_interval_ms: u64,
    pub poll_budget: u32,
    /// Consecutive polls with no working window tool before the locator gives up early.
    pub query_failure_threshold: u32,
    pub degraded_grace_ms: u64,
    pub tool_timeout_ms: u64,
    pub monitor_tick_ms: u64,
    pub monitor_iterations: u32,
    pub monitor_mutation_timeout_ms: u64,
    pub close_wait_ms: u64,
    pub termination_grace_ms: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            poll_budget: 200,
            query_failure_threshold: 20,
            degraded_grace_ms: 2000,
            tool_timeout_ms: 2000,
            monitor_tick_ms: 500,
            monitor_iterations: 600,
            monitor_mutation_timeout_ms: 1000,
            close_wait_ms: 500,
            termination_grace_ms: 2000,
        }
    }
}

impl Tuning {
    /// Load from a JSON file; a missing or broken file yields defaults.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<Tuning>(&raw) {
            Ok(tuning) => {
                tracing::debug!("Loaded tuning from {}", path.display());
                tuning
            }
            Err(e) => {
                tracing::warn!(
                    "Invalid config {}: {}; using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on a whole window search.
    pub fn locate_budget(&self) -> Duration {
        self.poll_interval() * self.poll_budget
    }

    pub fn degraded_grace(&self) -> Duration {
        Duration::from_millis(self.degraded_grace_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn monitor_tick(&self) -> Duration {
        Duration::from_millis(self.monitor_tick_ms)
    }

    pub fn monitor_mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor_mutation_timeout_ms)
    }

    pub fn close_wait(&self) -> Duration {
        Duration::from_millis(self.close_wait_ms)
    }

    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace_ms)
    }

    #[cfg(test)]
    pub fn fast() -> Self {
        Self {
            poll_interval_ms: 5,
            poll_budget: 40,
            query_failure_threshold: 4,
            degraded_grace_ms: 10,
            tool_timeout_ms: 50,
            monitor_tick_ms: 5,
            monitor_iterations: 20,
            monitor_mutation_timeout_ms: 20,
            close_wait_ms: 1,
            termination_grace_ms: 30,
        }
    }
}
