use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // Apply
    Set { wallpaper: String },
    Random,
    Delay { seconds: u64 },

    // Queries
    List,
    Status,

    // Control
    Stop,
}

/// Sound options forwarded verbatim to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    pub silent: bool,
    pub volume: Option<u32>,
    pub no_auto_mute: bool,
    pub no_audio_processing: bool,
}

impl SoundConfig {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.silent {
            args.push("--silent".to_string());
        }
        if let Some(volume) = self.volume {
            args.push("--volume".to_string());
            args.push(volume.to_string());
        }
        if self.no_auto_mute {
            args.push("--noautomute".to_string());
        }
        if self.no_audio_processing {
            args.push("--no-audio-processing".to_string());
        }
        args
    }
}

/// Where the backend draws: a fixed window geometry or a screen root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WindowMode {
    #[default]
    Background,
    ScreenRoot {
        output: String,
    },
    Windowed {
        geometry: String,
    },
}

impl WindowMode {
    pub fn to_args(&self) -> Vec<String> {
        match self {
            WindowMode::Background => vec![],
            WindowMode::ScreenRoot { output } => vec!["--screen-root".to_string(), output.clone()],
            WindowMode::Windowed { geometry } => vec!["--window".to_string(), geometry.clone()],
        }
    }
}

/// Parse an `XxYxWxH` window geometry.
pub fn parse_geometry(s: &str) -> Result<[i32; 4], String> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 4 {
        return Err(format!(
            "Invalid window geometry: {} (expected XxYxWxH, e.g. 0x0x1920x1080)",
            s
        ));
    }
    let mut out = [0i32; 4];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("Invalid window geometry component '{}' in {}", part, s))?;
    }
    Ok(out)
}

/// Immutable description of one invocation, built once by the command line
/// parser and passed by value into the launcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchRequest {
    pub directory: Option<PathBuf>,
    pub above: bool,
    pub pool: Vec<String>,
    pub sound: SoundConfig,
    pub window_mode: WindowMode,
    pub backend_override: Option<PathBuf>,
}

impl LaunchRequest {
    pub fn loop_config(&self, delay_seconds: u64) -> LoopConfig {
        LoopConfig {
            delay_seconds,
            pool: self.pool.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub delay_seconds: u64,
    /// Empty means rescan the wallpaper directory every iteration.
    pub pool: Vec<String>,
}
