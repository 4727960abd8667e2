use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Last known engine state, overwritten wholesale on every apply and stop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    pub last_pid: Option<i32>,
    pub last_windows: Vec<String>,
    pub last_wallpaper: String,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub sandboxed: bool,
}

impl EngineState {
    /// Parse a state document field by field. Missing or malformed fields
    /// fall back to their empty value; this never fails.
    pub fn from_json_lenient(raw: &str) -> Self {
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) else {
            return Self::default();
        };

        let last_pid = map
            .get("last_pid")
            .and_then(Value::as_i64)
            .and_then(|pid| i32::try_from(pid).ok())
            .filter(|pid| *pid > 0);

        let last_windows = map
            .get("last_windows")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let last_wallpaper = map
            .get("last_wallpaper")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let last_execution_time = map
            .get("last_execution_time")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));

        let sandboxed = map
            .get("sandboxed")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Self {
            last_pid,
            last_windows,
            last_wallpaper,
            last_execution_time,
            sandboxed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last_pid.is_none() && self.last_windows.is_empty() && self.last_wallpaper.is_empty()
    }
}
