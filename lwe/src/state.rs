use std::path::PathBuf;

use anyhow::{Context, Result};
use lwe_ipc::EngineState;

/// Single-writer store for [`EngineState`].
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Missing, unreadable or corrupt files read as empty state.
    pub fn load(&self) -> EngineState {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => EngineState::from_json_lenient(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => EngineState::default(),
            Err(e) => {
                tracing::warn!("Failed to read state {}: {}", self.path.display(), e);
                EngineState::default()
            }
        }
    }

    /// Replace the file atomically so readers never see a partial write.
    pub fn save(&self, state: &EngineState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
