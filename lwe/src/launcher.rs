use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lwe_ipc::LaunchRequest;

use crate::core::EngineProcess;
use crate::error::LaunchError;
use crate::linux::{Environment, HostDelegate};
use crate::platform::{CommandRunner, ProcessControl};

pub const BACKEND_BINARY: &str = "linux-wallpaperengine";

/// `pkill -f` pattern for backend processes. Anchored to argv[0] so it
/// never matches our own command line.
pub const BACKEND_PROCESS_PATTERN: &str = "^([^ ]*/)?linux-wallpaperengine( |$)";

fn is_backend_program(arg: &str) -> bool {
    Path::new(arg).file_name() == Some(std::ffi::OsStr::new(BACKEND_BINARY))
}

/// Whether `argv` runs the backend, directly or through `flatpak-spawn --host`.
pub fn is_backend_command(argv: &[String]) -> bool {
    let Some(program) = argv.first() else {
        return false;
    };
    if is_backend_program(program) {
        return true;
    }
    Path::new(program).file_name() == Some(std::ffi::OsStr::new("flatpak-spawn"))
        && argv[1..]
            .iter()
            .find(|arg| !arg.starts_with('-'))
            .is_some_and(|arg| is_backend_program(arg))
}

/// Where the backend binary lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendBinary {
    Local(PathBuf),
    /// Outside the sandbox; started through the host delegate.
    Host(PathBuf),
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Fixed install locations checked after `$PATH`.
fn standard_dirs() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from("/usr/bin"), PathBuf::from("/usr/local/bin")];
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join(".local").join("bin"));
    }
    locations.push(PathBuf::from("/opt/linux-wallpaperengine"));
    locations
}

pub struct BackendResolver {
    override_path: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
    host_lookup: Option<(Arc<dyn CommandRunner>, HostDelegate)>,
    timeout: Duration,
}

impl BackendResolver {
    pub fn new(override_path: Option<PathBuf>, search_dirs: Vec<PathBuf>) -> Self {
        Self {
            override_path,
            search_dirs,
            host_lookup: None,
            timeout: Duration::from_secs(2),
        }
    }

    /// Override, then `$PATH`, then the standard locations, then the host
    /// when sandboxed.
    pub fn for_environment(
        override_path: Option<PathBuf>,
        environment: Environment,
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
    ) -> Self {
        let mut search_dirs: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).collect())
            .unwrap_or_default();
        for dir in standard_dirs() {
            if !search_dirs.contains(&dir) {
                search_dirs.push(dir);
            }
        }

        let mut resolver = Self::new(override_path, search_dirs);
        resolver.timeout = timeout;
        match environment.host_delegate() {
            Some(delegate) => resolver.with_host_lookup(runner, delegate),
            None => resolver,
        }
    }

    fn with_host_lookup(mut self, runner: Arc<dyn CommandRunner>, delegate: HostDelegate) -> Self {
        self.host_lookup = Some((runner, delegate));
        self
    }

    pub async fn resolve(&self) -> Result<BackendBinary, LaunchError> {
        let mut searched = Vec::new();

        if let Some(path) = &self.override_path {
            if is_executable(path) {
                return Ok(BackendBinary::Local(path.clone()));
            }
            tracing::warn!("Backend override {} is not executable", path.display());
            searched.push(path.display().to_string());
        }

        for dir in &self.search_dirs {
            let candidate = dir.join(BACKEND_BINARY);
            if is_executable(&candidate) {
                tracing::debug!("Found backend at {}", candidate.display());
                return Ok(BackendBinary::Local(candidate));
            }
            searched.push(candidate.display().to_string());
        }

        if let Some((runner, delegate)) = &self.host_lookup {
            let (program, args) = delegate.wrap("which", &[BACKEND_BINARY.to_string()]);
            searched.push(format!("host: {} {}", program, args.join(" ")));
            match runner.run(&program, &args, self.timeout).await {
                Ok(output) if output.success => {
                    if let Some(line) = output.stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
                        tracing::debug!("Found backend on host at {}", line);
                        return Ok(BackendBinary::Host(PathBuf::from(line)));
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Host backend lookup failed: {}", e),
            }
        }

        Err(LaunchError::BackendNotFound { searched })
    }
}

/// Window-mode args, then sound args, then the wallpaper last.
pub fn build_args(request: &LaunchRequest, wallpaper: &Path) -> Vec<String> {
    let mut args = request.window_mode.to_args();
    args.extend(request.sound.to_args());
    args.push(wallpaper.display().to_string());
    args
}

pub struct EngineLauncher {
    resolver: BackendResolver,
    processes: Arc<dyn ProcessControl>,
    delegate: HostDelegate,
}

impl EngineLauncher {
    pub fn new(resolver: BackendResolver, processes: Arc<dyn ProcessControl>) -> Self {
        Self {
            resolver,
            processes,
            delegate: HostDelegate::flatpak(),
        }
    }

    pub async fn launch(
        &self,
        request: &LaunchRequest,
        wallpaper: &Path,
    ) -> Result<EngineProcess, LaunchError> {
        let binary = self.resolver.resolve().await?;
        let launch_args = build_args(request, wallpaper);

        let (program, args) = match &binary {
            BackendBinary::Local(path) => (path.clone(), launch_args.clone()),
            BackendBinary::Host(path) => {
                let (program, args) = self
                    .delegate
                    .wrap(&path.display().to_string(), &launch_args);
                (PathBuf::from(program), args)
            }
        };

        let pid = self
            .processes
            .spawn(&program, &args)
            .map_err(|e| LaunchError::SpawnFailed {
                program: program.clone(),
                reason: format!("{:#}", e),
            })?;
        tracing::info!(
            "[APPLY] Launched {} (pid {}) with {:?}",
            program.display(),
            pid,
            args
        );

        Ok(EngineProcess {
            pid,
            launch_args,
            wallpaper: wallpaper.to_path_buf(),
            started_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{MockDesktop, MockRunner};
    use crate::platform::ToolOutput;
    use lwe_ipc::{SoundConfig, WindowMode};

    fn install_fake_backend(dir: &Path) -> PathBuf {
        let path = dir.join(BACKEND_BINARY);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_args_put_wallpaper_last() {
        let request = LaunchRequest {
            sound: SoundConfig {
                silent: true,
                volume: Some(30),
                ..Default::default()
            },
            window_mode: WindowMode::ScreenRoot {
                output: "DP-1".to_string(),
            },
            ..Default::default()
        };
        assert_eq!(
            build_args(&request, Path::new("/walls/123")),
            vec!["--screen-root", "DP-1", "--silent", "--volume", "30", "/walls/123"]
        );
    }

    #[test]
    fn test_pattern_is_anchored_to_program() {
        assert!(BACKEND_PROCESS_PATTERN.starts_with('^'));
        assert!(BACKEND_PROCESS_PATTERN.contains(BACKEND_BINARY));
    }

    #[test]
    fn test_backend_command_recognition() {
        let argv = |args: &[&str]| args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(is_backend_command(&argv(&["/usr/bin/linux-wallpaperengine", "/walls/1"])));
        assert!(is_backend_command(&argv(&["linux-wallpaperengine"])));
        assert!(is_backend_command(&argv(&[
            "flatpak-spawn",
            "--host",
            "/usr/bin/linux-wallpaperengine",
            "/walls/1"
        ])));
        assert!(!is_backend_command(&argv(&["sleep", "30"])));
        assert!(!is_backend_command(&argv(&["vim", "linux-wallpaperengine"])));
        assert!(!is_backend_command(&argv(&["flatpak-spawn", "--host", "sleep"])));
        assert!(!is_backend_command(&[]));
    }

    #[tokio::test]
    async fn test_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = install_fake_backend(dir.path());
        let resolver = BackendResolver::new(Some(path.clone()), vec![]);
        assert_eq!(resolver.resolve().await.unwrap(), BackendBinary::Local(path));
    }

    #[tokio::test]
    async fn test_search_dirs_in_order() {
        let empty = tempfile::tempdir().unwrap();
        let installed = tempfile::tempdir().unwrap();
        let path = install_fake_backend(installed.path());
        let resolver = BackendResolver::new(
            Some(empty.path().join("missing")),
            vec![empty.path().to_path_buf(), installed.path().to_path_buf()],
        );
        assert_eq!(resolver.resolve().await.unwrap(), BackendBinary::Local(path));
    }

    #[tokio::test]
    async fn test_non_executable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(BACKEND_BINARY), "").unwrap();
        let resolver = BackendResolver::new(None, vec![dir.path().to_path_buf()]);
        assert!(resolver.resolve().await.is_err());
    }

    #[tokio::test]
    async fn test_host_lookup_when_sandboxed() {
        let runner = Arc::new(
            MockRunner::new()
                .with_output("flatpak-spawn", ToolOutput::ok("/usr/bin/linux-wallpaperengine\n")),
        );
        let resolver = BackendResolver::new(None, vec![])
            .with_host_lookup(runner.clone(), HostDelegate::flatpak());
        assert_eq!(
            resolver.resolve().await.unwrap(),
            BackendBinary::Host(PathBuf::from("/usr/bin/linux-wallpaperengine"))
        );
        assert_eq!(
            runner.calls()[0].1,
            vec!["--host", "which", "linux-wallpaperengine"]
        );
    }

    #[tokio::test]
    async fn test_host_asked_only_inside_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Some(dir.path().join("nothing-here"));
        let timeout = Duration::from_millis(50);

        let runner = Arc::new(MockRunner::new().with_output("flatpak-spawn", ToolOutput::failed()));
        let native =
            BackendResolver::for_environment(missing.clone(), Environment::Native, runner.clone(), timeout);
        let _ = native.resolve().await;
        assert!(runner.calls().is_empty());

        let sandboxed =
            BackendResolver::for_environment(missing, Environment::Sandboxed, runner.clone(), timeout);
        let _ = sandboxed.resolve().await;
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(runner.calls()[0].0, "flatpak-spawn");
    }

    #[tokio::test]
    async fn test_not_found_reports_all_locations() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::new().with_output("flatpak-spawn", ToolOutput::failed()));
        let resolver = BackendResolver::new(None, vec![dir.path().to_path_buf()])
            .with_host_lookup(runner, HostDelegate::flatpak());

        match resolver.resolve().await {
            Err(LaunchError::BackendNotFound { searched }) => {
                assert_eq!(searched.len(), 2);
                assert!(searched[0].starts_with(&dir.path().display().to_string()));
                assert!(searched[1].starts_with("host:"));
            }
            other => panic!("expected BackendNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_launch_spawns_resolved_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = install_fake_backend(dir.path());
        let desktop = Arc::new(MockDesktop::new());
        let launcher = EngineLauncher::new(BackendResolver::new(Some(path.clone()), vec![]), desktop.clone());

        let engine = launcher
            .launch(&LaunchRequest::default(), Path::new("/walls/42"))
            .await
            .unwrap();
        assert_eq!(engine.launch_args, vec!["/walls/42"]);
        assert!(desktop.is_alive(engine.pid));
        assert_eq!(desktop.spawned(), vec![(path, vec!["/walls/42".to_string()])]);
    }

    #[tokio::test]
    async fn test_host_binary_launches_through_delegate() {
        let runner = Arc::new(
            MockRunner::new().with_output("flatpak-spawn", ToolOutput::ok("/usr/bin/linux-wallpaperengine")),
        );
        let desktop = Arc::new(MockDesktop::new());
        let resolver =
            BackendResolver::new(None, vec![]).with_host_lookup(runner, HostDelegate::flatpak());
        let launcher = EngineLauncher::new(resolver, desktop.clone());

        launcher
            .launch(&LaunchRequest::default(), Path::new("/walls/42"))
            .await
            .unwrap();
        let (program, args) = desktop.spawned().remove(0);
        assert_eq!(program, PathBuf::from("flatpak-spawn"));
        assert_eq!(args, vec!["--host", "/usr/bin/linux-wallpaperengine", "/walls/42"]);
    }
}
