use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::core::{StateMutation, WindowHandle, WindowId, WindowSet};
use crate::linux::{Environment, WmctrlBackend};
use crate::platform::{CommandRunner, ListedWindow, WindowBackend};

/// Substrings identifying a backend window by WM_CLASS. Titles are not
/// matched: front-ends name their own windows after the backend.
pub const BACKEND_SIGNATURES: [&str; 2] = ["linux-wallpaperengine", "wallpaperengine"];

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub fn matches_signature(window: &ListedWindow) -> bool {
    let class = window.wm_class.to_lowercase();
    BACKEND_SIGNATURES.iter().any(|sig| class.contains(sig))
}

/// Result of one listing pass over all tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Windows(WindowSet),
    /// No tier could list windows at all.
    Unavailable,
}

/// Window queries and mutations over an ordered list of capability tiers.
/// Each operation goes to the first tier that succeeds; every attempt is time-boxed.
pub struct WindowQuery {
    tiers: Vec<Arc<dyn WindowBackend>>,
    attempt_timeout: Duration,
}

impl WindowQuery {
    pub fn new(tiers: Vec<Arc<dyn WindowBackend>>, attempt_timeout: Duration) -> Self {
        Self {
            tiers,
            attempt_timeout,
        }
    }

    /// Direct tool access first, then the host delegate when sandboxed.
    pub fn for_environment(
        environment: Environment,
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
    ) -> Self {
        let mut tiers: Vec<Arc<dyn WindowBackend>> =
            vec![Arc::new(WmctrlBackend::direct(runner.clone(), timeout))];
        if let Some(delegate) = environment.host_delegate() {
            tiers.push(Arc::new(WmctrlBackend::delegated(runner, delegate, timeout)));
        }
        Self::new(tiers, timeout)
    }

    async fn first_success<'a, T>(
        &'a self,
        what: &str,
        op: impl Fn(&'a dyn WindowBackend) -> BoxFuture<'a, Result<T>>,
    ) -> Option<T> {
        for tier in &self.tiers {
            match tokio::time::timeout(self.attempt_timeout, op(tier.as_ref())).await {
                Ok(Ok(value)) => return Some(value),
                Ok(Err(e)) => tracing::debug!("{} via {} failed: {}", what, tier.name(), e),
                Err(_) => tracing::debug!("{} via {} timed out", what, tier.name()),
            }
        }
        None
    }

    pub async fn listing(&self) -> Listing {
        match self
            .first_success("list windows", |tier| tier.list_windows())
            .await
        {
            Some(windows) => Listing::Windows(
                windows
                    .into_iter()
                    .filter(matches_signature)
                    .map(|w| w.handle)
                    .collect(),
            ),
            None => Listing::Unavailable,
        }
    }

    /// Backend windows currently visible. Empty when no tier works.
    pub async fn list_matching(&self) -> WindowSet {
        match self.listing().await {
            Listing::Windows(windows) => windows,
            Listing::Unavailable => WindowSet::new(),
        }
    }

    pub async fn set_state(&self, id: WindowId, mutation: StateMutation) -> bool {
        self.first_success("change state", move |tier| tier.change_state(id, mutation))
            .await
            .is_some()
    }

    pub async fn activate(&self, id: WindowId) -> bool {
        self.first_success("activate", move |tier| tier.activate(id))
            .await
            .is_some()
    }

    pub async fn close(&self, window: &WindowHandle) -> bool {
        let id = window.id;
        self.first_success("close", move |tier| tier.close(id))
            .await
            .is_some()
    }

    pub async fn active_window(&self) -> Option<WindowId> {
        self.first_success("active window", |tier| tier.active_window())
            .await
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{MockDesktop, BACKEND_CLASS};

    fn query(tiers: Vec<Arc<MockDesktop>>) -> WindowQuery {
        WindowQuery::new(
            tiers
                .into_iter()
                .map(|t| t as Arc<dyn WindowBackend>)
                .collect(),
            Duration::from_millis(50),
        )
    }

    #[test]
    fn test_signature_matching_is_case_insensitive() {
        let window = |class: &str, title: &str| ListedWindow {
            handle: WindowHandle::new(1, None),
            wm_class: class.to_string(),
            title: title.to_string(),
        };
        assert!(matches_signature(&window(BACKEND_CLASS, "")));
        assert!(matches_signature(&window("WallpaperEngine.Main", "x")));
        assert!(!matches_signature(&window("firefox.Firefox", "Wallpapers - Firefox")));
    }

    #[test]
    fn test_front_end_window_is_not_a_backend() {
        let gui = ListedWindow {
            handle: WindowHandle::new(0x77, Some(88)),
            wm_class: "tk.Tk".to_string(),
            title: "Linux Wallpaper Engine GUI".to_string(),
        };
        assert!(!matches_signature(&gui));
    }

    #[tokio::test]
    async fn test_listing_filters_foreign_windows() {
        let desktop = Arc::new(MockDesktop::new());
        desktop.add_window(0x10, Some(5), BACKEND_CLASS, "linux-wallpaperengine");
        desktop.add_window(0x20, Some(6), "kitty.kitty", "shell");
        let windows = query(vec![desktop]).list_matching().await;
        assert_eq!(windows.len(), 1);
        assert!(windows.contains(0x10));
    }

    #[tokio::test]
    async fn test_falls_through_to_next_tier() {
        let broken = Arc::new(MockDesktop::new().named("direct").unavailable());
        let working = Arc::new(MockDesktop::new().named("host-delegate"));
        working.add_window(0x10, Some(5), BACKEND_CLASS, "");
        let q = query(vec![broken.clone(), working.clone()]);

        assert!(q.list_matching().await.contains(0x10));
        assert!(q.set_state(0x10, StateMutation::AddBelow).await);
        assert_eq!(working.mutations(), vec![(0x10, StateMutation::AddBelow)]);
        assert_eq!(broken.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_all_tiers_broken_is_unavailable() {
        let q = query(vec![
            Arc::new(MockDesktop::new().unavailable()),
            Arc::new(MockDesktop::new().unavailable()),
        ]);
        assert_eq!(q.listing().await, Listing::Unavailable);
        assert!(q.list_matching().await.is_empty());
        assert!(!q.activate(1).await);
        assert_eq!(q.active_window().await, None);
    }

    #[tokio::test]
    async fn test_hanging_tier_is_time_boxed() {
        let q = query(vec![Arc::new(MockDesktop::new().hanging())]);
        let started = std::time::Instant::now();
        assert_eq!(q.listing().await, Listing::Unavailable);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
