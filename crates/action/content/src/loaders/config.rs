//! Engine configuration loader.

use std::path::Path;

use action_core::ActionConfig;
use anyhow::Context;

use crate::loaders::{LoadResult, read_file};

/// Loader for [`ActionConfig`] from TOML files.
///
/// Missing keys fall back to the engine defaults.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &Path) -> LoadResult<ActionConfig> {
        let content = read_file(path)?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn parse(content: &str) -> LoadResult<ActionConfig> {
        toml::from_str(content).context("failed to parse config TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "world_seed = 7\nmin_cooldown = 0.5\n").unwrap();

        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.world_seed, 7);
        assert_eq!(config.min_cooldown, 0.5);
        assert_eq!(config.max_pending_events, ActionConfig::DEFAULT_MAX_PENDING_EVENTS);
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(ConfigLoader::parse("max_pending_events = \"many\"").is_err());
    }
}
