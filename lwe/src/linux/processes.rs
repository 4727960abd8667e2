use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use super::HostDelegate;
use crate::platform::{CommandRunner, ProcessControl, ProcessSignal};

/// Process control backed by real signals and `pkill`.
pub struct SystemProcesses {
    // Children we spawned; kept so they can be reaped instead of lingering as zombies.
    children: Mutex<HashMap<i32, Child>>,
    runner: Arc<dyn CommandRunner>,
    delegate: Option<HostDelegate>,
    timeout: Duration,
}

impl SystemProcesses {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        delegate: Option<HostDelegate>,
        timeout: Duration,
    ) -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
            runner,
            delegate,
            timeout,
        }
    }

    fn reap(&self, pid: i32) -> Option<bool> {
        let mut children = self.children.lock().ok()?;
        let child = children.get_mut(&pid)?;
        match child.try_wait() {
            Ok(None) => Some(true),
            Ok(Some(status)) => {
                tracing::debug!("Backend pid {} exited: {}", pid, status);
                children.remove(&pid);
                Some(false)
            }
            Err(e) => {
                tracing::warn!("Failed to poll pid {}: {}", pid, e);
                children.remove(&pid);
                None
            }
        }
    }

    async fn pkill(&self, program: &str, args: &[String]) -> bool {
        match self.runner.run(program, args, self.timeout).await {
            Ok(output) => output.success,
            Err(e) => {
                tracing::debug!("pkill via {} failed: {}", program, e);
                false
            }
        }
    }
}

#[async_trait]
impl ProcessControl for SystemProcesses {
    fn spawn(&self, program: &Path, args: &[String]) -> Result<i32> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // New session so the backend outlives a Ctrl-C on our terminal.
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", program.display()))?;
        let pid = child.id() as i32;
        if let Ok(mut children) = self.children.lock() {
            children.insert(pid, child);
        }
        Ok(pid)
    }

    fn is_alive(&self, pid: i32) -> bool {
        if pid <= 0 {
            return false;
        }
        if let Some(alive) = self.reap(pid) {
            return alive;
        }
        match kill(Pid::from_raw(pid), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn signal(&self, pid: i32, signal: ProcessSignal) -> Result<()> {
        let sig = match signal {
            ProcessSignal::Terminate => Signal::SIGTERM,
            ProcessSignal::Kill => Signal::SIGKILL,
        };
        match kill(Pid::from_raw(pid), sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to send {:?} to pid {}", sig, pid)),
        }
    }

    fn command_line(&self, pid: i32) -> Option<Vec<String>> {
        if pid <= 0 {
            return None;
        }
        let raw = std::fs::read(format!("/proc/{}/cmdline", pid)).ok()?;
        Some(
            raw.split(|b| *b == 0)
                .filter(|arg| !arg.is_empty())
                .map(|arg| String::from_utf8_lossy(arg).into_owned())
                .collect(),
        )
    }

    async fn kill_matching(&self, pattern: &str) -> bool {
        let args = vec!["-f".to_string(), pattern.to_string()];
        let mut killed = self.pkill("pkill", &args).await;
        if let Some(delegate) = &self.delegate {
            let (program, wrapped) = delegate.wrap("pkill", &args);
            killed |= self.pkill(&program, &wrapped).await;
        }
        killed
    }
}
