use quire_editor::{DocumentOptions, DEFAULT_INDENT_UNIT, DEFAULT_UNDO_LEVELS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_NAME: &str = "quire.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Engine configuration file format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Undo history capacity per document (0 = unlimited)
    #[serde(default = "default_undo_levels")]
    pub undo_levels: usize,

    /// Resolutions allowed to run at once
    #[serde(default = "default_resolver_workers")]
    pub resolver_workers: usize,

    /// Window in which file events are coalesced
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Indentation for structure added to elements with no formatting cue
    #[serde(default = "default_indent_unit")]
    pub indent_unit: String,
}

fn default_undo_levels() -> usize {
    DEFAULT_UNDO_LEVELS
}

fn default_resolver_workers() -> usize {
    2
}

fn default_watch_debounce_ms() -> u64 {
    50
}

fn default_indent_unit() -> String {
    DEFAULT_INDENT_UNIT.to_string()
}

impl EngineConfig {
    /// Load config from a directory, defaults when there is none
    pub fn load(cwd: &Path) -> Result<Self, ConfigError> {
        let config_path = cwd.join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(EngineConfig::default())
        }
    }

    pub fn document_options(&self) -> DocumentOptions {
        DocumentOptions {
            undo_levels: self.undo_levels,
            indent_unit: self.indent_unit.clone(),
        }
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            undo_levels: default_undo_levels(),
            resolver_workers: default_resolver_workers(),
            watch_debounce_ms: default_watch_debounce_ms(),
            indent_unit: default_indent_unit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "undoLevels": 20,
            "resolverWorkers": 4,
            "indentUnit": "\t"
        }"#;

        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.undo_levels, 20);
        assert_eq!(config.resolver_workers, 4);
        assert_eq!(config.watch_debounce_ms, 50);
        assert_eq!(config.document_options().indent_unit, "\t");
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.undo_levels, 100);
        assert_eq!(config.resolver_workers, 2);
        assert_eq!(config.watch_debounce(), Duration::from_millis(50));
        assert_eq!(config.indent_unit, "  ");
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(EngineConfig::load(dir.path()).unwrap(), EngineConfig::default());

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), r#"{ "watchDebounceMs": 10 }"#).unwrap();
        assert_eq!(EngineConfig::load(dir.path()).unwrap().watch_debounce_ms, 10);

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), "{ nope").unwrap();
        assert!(matches!(EngineConfig::load(dir.path()), Err(ConfigError::Invalid(_))));
    }
}
