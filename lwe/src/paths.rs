use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const DATA_DIR_NAME: &str = "linux-wallpaper-engine-features";

/// Files owned by this tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub log_file: PathBuf,
    pub state_file: PathBuf,
    pub pid_file: PathBuf,
    pub config_file: PathBuf,
}

impl Paths {
    /// `$LWE_DATA_DIR` / `$LWE_CONFIG` win over the XDG defaults.
    pub fn resolve(config_override: Option<PathBuf>) -> Result<Self> {
        let data_dir = match std::env::var_os("LWE_DATA_DIR").filter(|v| !v.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .context("Cannot determine the local data directory")?
                .join(DATA_DIR_NAME),
        };

        let config_file = match config_override
            .or_else(|| std::env::var_os("LWE_CONFIG").map(PathBuf::from))
        {
            Some(path) => path,
            None => dirs::config_dir()
                .context("Cannot determine the config directory")?
                .join("lwe")
                .join("config.json"),
        };

        Ok(Self::in_dir(&data_dir, config_file))
    }

    pub fn in_dir(data_dir: &Path, config_file: PathBuf) -> Self {
        Self {
            log_file: data_dir.join("logs.txt"),
            state_file: data_dir.join("state.json"),
            pid_file: data_dir.join("loop.pid"),
            config_file,
        }
    }
}
