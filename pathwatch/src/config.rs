//! Configuration for the path watcher.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration for a [`Watcher`](crate::Watcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Capacity of the backend event channel shared by all watch loops.
    ///
    /// A loop that falls further behind than this loses events and emits a
    /// conservative change notification.
    pub event_capacity: usize,

    /// Whether a change of the resolved symlink target counts as a change,
    /// even when no event names the watched file itself.
    pub detect_symlink_swaps: bool,
}

impl WatcherConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            event_capacity: 1024,
            detect_symlink_swaps: true,
        }
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Only report events that name the watched file directly.
    pub fn without_symlink_swaps(mut self) -> Self {
        self.detect_symlink_swaps = false;
        self
    }

    /// Parse a config from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(s)?;
        config.event_capacity = config.event_capacity.max(1);
        Ok(config)
    }

    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_defaults() {
        let config = WatcherConfig::default();
        assert_eq!(config.event_capacity, 1024);
        assert!(config.detect_symlink_swaps);
    }

    #[test]
    fn test_config_from_toml() {
        let config = WatcherConfig::from_toml_str("detect_symlink_swaps = false").unwrap();
        assert_eq!(config, WatcherConfig::new().without_symlink_swaps());

        let config = WatcherConfig::from_toml_str("event_capacity = 0").unwrap();
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_config_rejects_bad_types() {
        assert!(WatcherConfig::from_toml_str("event_capacity = \"lots\"").is_err());
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("watch.toml");
        std::fs::write(&path, "event_capacity = 16\n").unwrap();

        let config = WatcherConfig::load(&path).unwrap();
        assert_eq!(config.event_capacity, 16);
        assert!(config.detect_symlink_swaps);
    }
}
