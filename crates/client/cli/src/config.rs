//! CLI configuration structures and loaders.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration required to run a demo session.
#[derive(Clone, Debug)]
pub struct CliConfig {
    /// Content directory; the embedded sample data is used when absent.
    pub data_dir: Option<PathBuf>,
    pub client_count: u32,
    pub ticks: u64,
    pub tick_interval: Duration,
    pub session_id: Option<String>,
    pub log_dir: Option<PathBuf>,
    /// Where to write the JSON session summary; stdout when absent.
    pub summary_path: Option<PathBuf>,
    pub log_to_stderr: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            client_count: 2,
            ticks: 60,
            tick_interval: Duration::from_millis(50),
            session_id: None,
            log_dir: None,
            summary_path: None,
            log_to_stderr: true,
        }
    }
}

impl CliConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `ACTION_DATA_DIR` - Content directory (default: embedded sample data)
    /// - `ACTION_CLIENTS` - Connected clients (default: 2)
    /// - `ACTION_TICKS` - Ticks to simulate (default: 60)
    /// - `ACTION_TICK_MS` - Tick length in milliseconds (default: 50)
    /// - `ACTION_SESSION_ID` - Session identifier for logs (default: auto-generated)
    /// - `ACTION_LOG_DIR` - Log directory (default: platform cache dir)
    /// - `ACTION_SUMMARY` - Summary output file (default: stdout)
    /// - `ACTION_LOG_STDERR` - Mirror logs to stderr (default: true)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let mut config = Self::default();

        config.data_dir = read("ACTION_DATA_DIR").map(PathBuf::from);
        if let Some(count) = read("ACTION_CLIENTS").and_then(|v| v.parse::<u32>().ok()) {
            config.client_count = count.max(1);
        }
        if let Some(ticks) = read("ACTION_TICKS").and_then(|v| v.parse().ok()) {
            config.ticks = ticks;
        }
        if let Some(ms) = read("ACTION_TICK_MS").and_then(|v| v.parse::<u64>().ok()) {
            config.tick_interval = Duration::from_millis(ms.max(1));
        }
        config.session_id = read("ACTION_SESSION_ID");
        config.log_dir = read("ACTION_LOG_DIR").map(PathBuf::from);
        config.summary_path = read("ACTION_SUMMARY").map(PathBuf::from);
        if let Some(enable) = read("ACTION_LOG_STDERR").and_then(|v| v.parse().ok()) {
            config.log_to_stderr = enable;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> CliConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CliConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_variables() {
        let config = config(&[]);
        assert_eq!(config.client_count, 2);
        assert_eq!(config.ticks, 60);
        assert!(config.data_dir.is_none());
        assert!(config.log_to_stderr);
    }

    #[test]
    fn variables_override_defaults() {
        let config = config(&[
            ("ACTION_CLIENTS", "0"),
            ("ACTION_TICKS", "10"),
            ("ACTION_TICK_MS", "20"),
            ("ACTION_DATA_DIR", "/srv/content"),
            ("ACTION_LOG_STDERR", "false"),
        ]);
        assert_eq!(config.client_count, 1);
        assert_eq!(config.ticks, 10);
        assert_eq!(config.tick_interval, Duration::from_millis(20));
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/content")));
        assert!(!config.log_to_stderr);
    }

    #[test]
    fn unparsable_values_are_ignored() {
        let config = config(&[("ACTION_TICKS", "many"), ("ACTION_SESSION_ID", "")]);
        assert_eq!(config.ticks, 60);
        assert!(config.session_id.is_none());
    }
}
