use std::fmt;

pub type WindowId = u64;

/// A backend window as reported by the window query tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle {
    pub id: WindowId,
    pub pid: Option<i32>,
}

impl WindowHandle {
    pub fn new(id: WindowId, pid: Option<i32>) -> Self {
        Self { id, pid }
    }

    pub fn token(&self) -> String {
        format_window_id(self.id)
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "{} (pid {})", self.token(), pid),
            None => write!(f, "{}", self.token()),
        }
    }
}

pub fn format_window_id(id: WindowId) -> String {
    format!("0x{:08x}", id)
}

/// Accepts `0x`-prefixed hex (wmctrl, xprop) or plain decimal.
pub fn parse_window_id(token: &str) -> Option<WindowId> {
    let token = token.trim().trim_end_matches(',');
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        WindowId::from_str_radix(hex, 16).ok()
    } else {
        token.parse().ok()
    }
}

/// Ordered, deduplicated set of windows, first-seen order preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSet {
    windows: Vec<WindowHandle>,
}

impl WindowSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, window: WindowHandle) -> bool {
        if self.contains(window.id) {
            return false;
        }
        self.windows.push(window);
        true
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.windows.iter().any(|w| w.id == id)
    }

    /// Windows in `self` that are not in `old`, in first-seen order.
    pub fn difference(&self, old: &WindowSet) -> WindowSet {
        self.windows
            .iter()
            .filter(|w| !old.contains(w.id))
            .cloned()
            .collect()
    }

    pub fn first(&self) -> Option<&WindowHandle> {
        self.windows.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowHandle> {
        self.windows.iter()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Rebuild a set from persisted tokens, skipping unparsable entries.
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a String>) -> Self {
        tokens
            .into_iter()
            .filter_map(|t| parse_window_id(t))
            .map(|id| WindowHandle::new(id, None))
            .collect()
    }
}

impl FromIterator<WindowHandle> for WindowSet {
    fn from_iter<I: IntoIterator<Item = WindowHandle>>(iter: I) -> Self {
        let mut set = WindowSet::new();
        for w in iter {
            set.insert(w);
        }
        set
    }
}

/// Window-manager state change, applied in the order listed by
/// [`StateMutation::WALLPAPER_SEQUENCE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateMutation {
    RemoveAbove,
    AddSkipSwitcher,
    AddBelow,
}

impl StateMutation {
    pub const WALLPAPER_SEQUENCE: [StateMutation; 3] = [
        StateMutation::RemoveAbove,
        StateMutation::AddSkipSwitcher,
        StateMutation::AddBelow,
    ];

    /// Argument for `wmctrl -b`.
    pub fn wmctrl_action(&self) -> &'static str {
        match self {
            StateMutation::RemoveAbove => "remove,above",
            StateMutation::AddSkipSwitcher => "add,skip_taskbar,skip_pager",
            StateMutation::AddBelow => "add,below",
        }
    }
}

impl fmt::Display for StateMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateMutation::RemoveAbove => "remove-above",
            StateMutation::AddSkipSwitcher => "add-skip-switcher",
            StateMutation::AddBelow => "add-below",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[WindowId]) -> WindowSet {
        ids.iter().map(|id| WindowHandle::new(*id, None)).collect()
    }

    #[test]
    fn test_parse_window_id() {
        assert_eq!(parse_window_id("0x03a00003"), Some(0x03a00003));
        assert_eq!(parse_window_id("0X10"), Some(16));
        assert_eq!(parse_window_id("60817411"), Some(60817411));
        assert_eq!(parse_window_id("0x3a00003,"), Some(0x3a00003));
        assert_eq!(parse_window_id("nope"), None);
    }

    #[test]
    fn test_token_round_trip() {
        let handle = WindowHandle::new(0x3a00003, Some(10));
        assert_eq!(handle.token(), "0x03a00003");
        assert_eq!(parse_window_id(&handle.token()), Some(0x3a00003));
    }

    #[test]
    fn test_set_deduplicates_preserving_order() {
        let s = set(&[3, 1, 3, 2, 1]);
        let ids: Vec<WindowId> = s.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_difference_excludes_old() {
        let current = set(&[1, 2, 3, 4]);
        let old = set(&[1, 3]);
        let new = current.difference(&old);
        assert_eq!(new.first().map(|w| w.id), Some(2));
        assert!(new.iter().all(|w| !old.contains(w.id)));
        assert_eq!(new.len(), 2);
    }

    #[test]
    fn test_from_tokens_skips_garbage() {
        let tokens = vec!["0x01".to_string(), "garbage".to_string(), "0x02".to_string()];
        let s = WindowSet::from_tokens(&tokens);
        let ids: Vec<WindowId> = s.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_mutation_sequence_order() {
        assert_eq!(
            StateMutation::WALLPAPER_SEQUENCE
                .iter()
                .map(|m| m.wmctrl_action())
                .collect::<Vec<_>>(),
            vec!["remove,above", "add,skip_taskbar,skip_pager", "add,below"]
        );
    }
}
