use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::core::{StateMutation, WindowHandle, WindowId};

/// Result of running an external tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
}

#[cfg(test)]
impl ToolOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }
}

/// Runs external tools. Abstracted so window and process backends can be
/// tested without a display server.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program args...`, killing it if `timeout` elapses.
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ToolOutput>;
}

/// A window reported by a backend, before signature matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedWindow {
    pub handle: WindowHandle,
    pub wm_class: String,
    pub title: String,
}

/// One capability tier for querying and mutating windows.
#[async_trait]
pub trait WindowBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn list_windows(&self) -> Result<Vec<ListedWindow>>;
    async fn change_state(&self, id: WindowId, mutation: StateMutation) -> Result<()>;
    async fn activate(&self, id: WindowId) -> Result<()>;
    async fn close(&self, id: WindowId) -> Result<()>;
    async fn active_window(&self) -> Result<Option<WindowId>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    Terminate,
    Kill,
}

/// Spawning, probing and signalling backend processes.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Spawn detached from our session; returns the PID.
    fn spawn(&self, program: &Path, args: &[String]) -> Result<i32>;
    /// Non-blocking liveness check.
    fn is_alive(&self, pid: i32) -> bool;
    fn signal(&self, pid: i32, signal: ProcessSignal) -> Result<()>;
    /// argv of a running process, or `None` if it cannot be read.
    fn command_line(&self, pid: i32) -> Option<Vec<String>>;
    /// Kill every process whose command line matches `pattern`.
    /// Returns true if anything was signalled.
    async fn kill_matching(&self, pattern: &str) -> bool;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub const BACKEND_CLASS: &str = "linux-wallpaperengine.linux-wallpaperengine";

    #[derive(Default)]
    struct DesktopState {
        windows: Vec<ListedWindow>,
        alive: HashSet<i32>,
        command_lines: HashMap<i32, Vec<String>>,
        spawned: Vec<(PathBuf, Vec<String>)>,
        signals: Vec<(i32, ProcessSignal)>,
        mutations: Vec<(WindowId, StateMutation)>,
        activations: Vec<WindowId>,
        closed: Vec<WindowId>,
        active: Option<WindowId>,
        next_pid: i32,
        next_window: WindowId,
        unavailable: bool,
        hang: bool,
        spawn_creates_window: bool,
        ignore_terminate: bool,
        failing: HashSet<StateMutation>,
        fail_until_activated: bool,
    }

    /// Simulated X desktop: a window backend and process table in one, so a
    /// spawned "backend" can create its window like the real one does.
    pub struct MockDesktop {
        name: String,
        state: Mutex<DesktopState>,
        list_calls: AtomicUsize,
    }

    impl MockDesktop {
        pub fn new() -> Self {
            Self {
                name: "mock".to_string(),
                state: Mutex::new(DesktopState {
                    next_pid: 1000,
                    next_window: 0x0400_0001,
                    spawn_creates_window: true,
                    ..Default::default()
                }),
                list_calls: AtomicUsize::new(0),
            }
        }

        pub fn named(mut self, name: &str) -> Self {
            self.name = name.to_string();
            self
        }

        pub fn unavailable(self) -> Self {
            self.state.lock().unwrap().unavailable = true;
            self
        }

        pub fn hanging(self) -> Self {
            self.state.lock().unwrap().hang = true;
            self
        }

        pub fn without_spawned_windows(self) -> Self {
            self.state.lock().unwrap().spawn_creates_window = false;
            self
        }

        pub fn ignoring_terminate(self) -> Self {
            self.state.lock().unwrap().ignore_terminate = true;
            self
        }

        pub fn failing(self, mutation: StateMutation) -> Self {
            self.state.lock().unwrap().failing.insert(mutation);
            self
        }

        /// Mutations fail until the window has been activated once.
        pub fn requiring_activation(self) -> Self {
            self.state.lock().unwrap().fail_until_activated = true;
            self
        }

        pub fn with_active(self, id: WindowId) -> Self {
            self.state.lock().unwrap().active = Some(id);
            self
        }

        pub fn add_window(&self, id: WindowId, pid: Option<i32>, wm_class: &str, title: &str) {
            self.state.lock().unwrap().windows.push(ListedWindow {
                handle: WindowHandle::new(id, pid),
                wm_class: wm_class.to_string(),
                title: title.to_string(),
            });
        }

        /// A running backend process we did not spawn.
        pub fn add_process(&self, pid: i32) {
            self.add_process_with(pid, &["/usr/bin/linux-wallpaperengine", "/walls/1"]);
        }

        pub fn add_process_with(&self, pid: i32, argv: &[&str]) {
            let mut state = self.state.lock().unwrap();
            state.alive.insert(pid);
            state
                .command_lines
                .insert(pid, argv.iter().map(|s| s.to_string()).collect());
        }

        pub fn exit_process(&self, pid: i32) {
            let mut state = self.state.lock().unwrap();
            state.alive.remove(&pid);
            state.windows.retain(|w| w.handle.pid != Some(pid));
        }

        pub fn mutations(&self) -> Vec<(WindowId, StateMutation)> {
            self.state.lock().unwrap().mutations.clone()
        }

        pub fn mutation_count(&self) -> usize {
            self.state.lock().unwrap().mutations.len()
        }

        pub fn activations(&self) -> Vec<WindowId> {
            self.state.lock().unwrap().activations.clone()
        }

        pub fn closed(&self) -> Vec<WindowId> {
            self.state.lock().unwrap().closed.clone()
        }

        pub fn spawned(&self) -> Vec<(PathBuf, Vec<String>)> {
            self.state.lock().unwrap().spawned.clone()
        }

        pub fn signals(&self) -> Vec<(i32, ProcessSignal)> {
            self.state.lock().unwrap().signals.clone()
        }

        pub fn window_ids(&self) -> Vec<WindowId> {
            self.state
                .lock()
                .unwrap()
                .windows
                .iter()
                .map(|w| w.handle.id)
                .collect()
        }

        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        fn check_available(&self) -> Result<()> {
            if self.state.lock().unwrap().unavailable {
                anyhow::bail!("{}: window tool unavailable", self.name);
            }
            Ok(())
        }

        async fn maybe_hang(&self) {
            let hang = self.state.lock().unwrap().hang;
            if hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    }

    impl Default for MockDesktop {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl WindowBackend for MockDesktop {
        fn name(&self) -> &str {
            &self.name
        }

        async fn list_windows(&self) -> Result<Vec<ListedWindow>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.maybe_hang().await;
            self.check_available()?;
            Ok(self.state.lock().unwrap().windows.clone())
        }

        async fn change_state(&self, id: WindowId, mutation: StateMutation) -> Result<()> {
            self.maybe_hang().await;
            self.check_available()?;
            let mut state = self.state.lock().unwrap();
            if state.failing.contains(&mutation) {
                anyhow::bail!("{} rejected for {}", mutation, id);
            }
            if state.fail_until_activated && !state.activations.contains(&id) {
                anyhow::bail!("{} needs an active window", mutation);
            }
            state.mutations.push((id, mutation));
            Ok(())
        }

        async fn activate(&self, id: WindowId) -> Result<()> {
            self.check_available()?;
            let mut state = self.state.lock().unwrap();
            state.activations.push(id);
            state.active = Some(id);
            Ok(())
        }

        async fn close(&self, id: WindowId) -> Result<()> {
            self.check_available()?;
            let mut state = self.state.lock().unwrap();
            state.closed.push(id);
            state.windows.retain(|w| w.handle.id != id);
            Ok(())
        }

        async fn active_window(&self) -> Result<Option<WindowId>> {
            self.check_available()?;
            Ok(self.state.lock().unwrap().active)
        }
    }

    #[async_trait]
    impl ProcessControl for MockDesktop {
        fn spawn(&self, program: &Path, args: &[String]) -> Result<i32> {
            let mut state = self.state.lock().unwrap();
            state.next_pid += 1;
            let pid = state.next_pid;
            state.alive.insert(pid);
            let mut argv = vec![program.display().to_string()];
            argv.extend_from_slice(args);
            state.command_lines.insert(pid, argv);
            state.spawned.push((program.to_path_buf(), args.to_vec()));
            if state.spawn_creates_window {
                state.next_window += 1;
                let id = state.next_window;
                state.windows.push(ListedWindow {
                    handle: WindowHandle::new(id, Some(pid)),
                    wm_class: BACKEND_CLASS.to_string(),
                    title: "linux-wallpaperengine".to_string(),
                });
            }
            Ok(pid)
        }

        fn is_alive(&self, pid: i32) -> bool {
            self.state.lock().unwrap().alive.contains(&pid)
        }

        fn signal(&self, pid: i32, signal: ProcessSignal) -> Result<()> {
            let ignore = {
                let mut state = self.state.lock().unwrap();
                state.signals.push((pid, signal));
                state.ignore_terminate
            };
            if signal == ProcessSignal::Kill || !ignore {
                self.exit_process(pid);
            }
            Ok(())
        }

        fn command_line(&self, pid: i32) -> Option<Vec<String>> {
            let state = self.state.lock().unwrap();
            if !state.alive.contains(&pid) {
                return None;
            }
            state.command_lines.get(&pid).cloned()
        }

        /// Kills live backend processes only, like the anchored `pkill` pattern.
        async fn kill_matching(&self, _pattern: &str) -> bool {
            let pids: Vec<i32> = {
                let state = self.state.lock().unwrap();
                state
                    .alive
                    .iter()
                    .copied()
                    .filter(|pid| {
                        state
                            .command_lines
                            .get(pid)
                            .is_some_and(|argv| crate::launcher::is_backend_command(argv))
                    })
                    .collect()
            };
            for pid in &pids {
                self.exit_process(*pid);
            }
            !pids.is_empty()
        }
    }

    /// Scripted [`CommandRunner`] keyed by program name.
    #[derive(Default)]
    pub struct MockRunner {
        outputs: Mutex<HashMap<String, ToolOutput>>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl MockRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_output(self, program: &str, output: ToolOutput) -> Self {
            self.outputs
                .lock()
                .unwrap()
                .insert(program.to_string(), output);
            self
        }

        pub fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> Result<ToolOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            self.outputs
                .lock()
                .unwrap()
                .get(program)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("{}: command not found", program))
        }
    }
}
