use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::HostDelegate;
use crate::core::{format_window_id, parse_window_id, StateMutation, WindowHandle, WindowId};
use crate::platform::{CommandRunner, ListedWindow, ToolOutput, WindowBackend};

/// Window backend driving `wmctrl` and `xprop`, optionally through a host delegate.
pub struct WmctrlBackend {
    name: String,
    runner: Arc<dyn CommandRunner>,
    delegate: Option<HostDelegate>,
    timeout: Duration,
}

impl WmctrlBackend {
    pub fn direct(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            name: "direct".to_string(),
            runner,
            delegate: None,
            timeout,
        }
    }

    pub fn delegated(
        runner: Arc<dyn CommandRunner>,
        delegate: HostDelegate,
        timeout: Duration,
    ) -> Self {
        Self {
            name: "host-delegate".to_string(),
            runner,
            delegate: Some(delegate),
            timeout,
        }
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput> {
        let output = match &self.delegate {
            Some(delegate) => {
                let (program, args) = delegate.wrap(program, args);
                self.runner.run(&program, &args, self.timeout).await?
            }
            None => self.runner.run(program, args, self.timeout).await?,
        };
        if !output.success {
            bail!("{} failed via {} backend", program, self.name);
        }
        Ok(output)
    }

    async fn wmctrl_on(&self, id: WindowId, flag: &str, extra: &[&str]) -> Result<()> {
        let mut args = vec!["-i".to_string(), flag.to_string(), format_window_id(id)];
        args.extend(extra.iter().map(|s| s.to_string()));
        self.run("wmctrl", &args).await.map(|_| ())
    }
}

#[async_trait]
impl WindowBackend for WmctrlBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_windows(&self) -> Result<Vec<ListedWindow>> {
        let output = self.run("wmctrl", &["-lpx".to_string()]).await?;
        Ok(parse_wmctrl_listing(&output.stdout))
    }

    async fn change_state(&self, id: WindowId, mutation: StateMutation) -> Result<()> {
        self.wmctrl_on(id, "-r", &["-b", mutation.wmctrl_action()])
            .await
    }

    async fn activate(&self, id: WindowId) -> Result<()> {
        self.wmctrl_on(id, "-a", &[]).await
    }

    async fn close(&self, id: WindowId) -> Result<()> {
        self.wmctrl_on(id, "-c", &[]).await
    }

    async fn active_window(&self) -> Result<Option<WindowId>> {
        let args = ["-root".to_string(), "_NET_ACTIVE_WINDOW".to_string()];
        let output = self.run("xprop", &args).await?;
        Ok(parse_active_window(&output.stdout))
    }
}

/// Parse `wmctrl -lpx` output:
/// `<id> <desktop> <pid> <wm_class> <host> <title...>`
pub fn parse_wmctrl_listing(output: &str) -> Vec<ListedWindow> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let id = parse_window_id(fields.next()?)?;
            let _desktop = fields.next()?;
            let pid = fields
                .next()?
                .parse::<i32>()
                .ok()
                .filter(|pid| *pid > 0);
            let wm_class = fields.next()?.to_string();
            let _host = fields.next();
            let title = fields.collect::<Vec<_>>().join(" ");
            Some(ListedWindow {
                handle: WindowHandle::new(id, pid),
                wm_class,
                title,
            })
        })
        .collect()
}

/// Parse `xprop -root _NET_ACTIVE_WINDOW`, e.g.
/// `_NET_ACTIVE_WINDOW(WINDOW): window id # 0x3a00003`.
pub fn parse_active_window(output: &str) -> Option<WindowId> {
    let token = output.rsplit('#').next()?.split_whitespace().next()?;
    parse_window_id(token).filter(|id| *id != 0)
}
