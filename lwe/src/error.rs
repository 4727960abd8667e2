use std::fmt;
use std::path::PathBuf;

/// Errors that stop a launch outright.
#[derive(Debug)]
pub enum LaunchError {
    /// No backend binary at any known location.
    BackendNotFound { searched: Vec<String> },
    /// The binary was found but could not be started.
    SpawnFailed { program: PathBuf, reason: String },
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackendNotFound { searched } => {
                writeln!(f, "linux-wallpaperengine not found. Searched:")?;
                for location in searched {
                    writeln!(f, "  {location}")?;
                }
                write!(f, "Install it or pass --backend <path>.")
            }
            Self::SpawnFailed { program, reason } => {
                write!(f, "Failed to start {}: {reason}", program.display())
            }
        }
    }
}

impl std::error::Error for LaunchError {}
