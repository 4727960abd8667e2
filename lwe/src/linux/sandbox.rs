use std::path::Path;

/// Execution environment of this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Native,
    /// Inside a Flatpak sandbox; host tools are reached through a delegate.
    Sandboxed,
}

impl Environment {
    pub fn detect() -> Self {
        let flatpak_info = Path::new("/.flatpak-info").exists();
        let flatpak_id = std::env::var_os("FLATPAK_ID").is_some_and(|v| !v.is_empty());
        Self::from_markers(flatpak_info, flatpak_id)
    }

    fn from_markers(flatpak_info: bool, flatpak_id: bool) -> Self {
        if flatpak_info || flatpak_id {
            Environment::Sandboxed
        } else {
            Environment::Native
        }
    }

    pub fn is_sandboxed(&self) -> bool {
        matches!(self, Environment::Sandboxed)
    }

    /// Delegate for running commands outside the sandbox, if any.
    pub fn host_delegate(&self) -> Option<HostDelegate> {
        self.is_sandboxed().then(HostDelegate::flatpak)
    }
}

/// Command prefix that executes a tool on the host side of the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDelegate {
    program: String,
    args: Vec<String>,
}

impl HostDelegate {
    pub fn flatpak() -> Self {
        Self {
            program: "flatpak-spawn".to_string(),
            args: vec!["--host".to_string()],
        }
    }

    pub fn wrap(&self, program: &str, args: &[String]) -> (String, Vec<String>) {
        let mut full = self.args.clone();
        full.push(program.to_string());
        full.extend_from_slice(args);
        (self.program.clone(), full)
    }
}
