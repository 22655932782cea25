//! Runtime configuration.
//!
//! Settings are read from `<config dir>/keyhook/config.json` when present,
//! with a few environment overrides applied on top.

use crate::error::{HookError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides [`HookConfig::consume_on_install`].
pub const CONSUME_ENV_VAR: &str = "KEYHOOK_CONSUME";

/// Configuration for the keyboard hook context and demo binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Initial consume mode applied when the context is created (default: false).
    pub consume_on_install: bool,

    /// Name given to consumer dispatcher threads.
    pub dispatcher_thread_name: String,

    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,

    /// How often the demo binary logs channel statistics (default: 30s).
    pub stats_interval_secs: u64,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            consume_on_install: false,
            dispatcher_thread_name: "keyhook-dispatch".to_string(),
            log_filter: "keyhook=info".to_string(),
            stats_interval_secs: 30,
        }
    }
}

impl HookConfig {
    /// Loads configuration from the default location, falling back to defaults
    /// when no file exists. Environment overrides are applied last.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = if path.exists() {
            tracing::debug!(path = ?path, "Loading configuration");
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| HookError::Config(format!("{}: {}", path.display(), e)))?;
            Self::from_json(&contents)?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parses configuration from a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| HookError::Config(e.to_string()))
    }

    /// Returns the default configuration file path.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keyhook")
            .join("config.json")
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(CONSUME_ENV_VAR) {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.consume_on_install = true,
                "0" | "false" | "no" => self.consume_on_install = false,
                other => {
                    tracing::warn!(value = other, "Ignoring unrecognised {}", CONSUME_ENV_VAR)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HookConfig::default();
        assert!(!config.consume_on_install);
        assert_eq!(config.dispatcher_thread_name, "keyhook-dispatch");
        assert_eq!(config.log_filter, "keyhook=info");
        assert_eq!(config.stats_interval_secs, 30);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = HookConfig::from_json(r#"{ "consume_on_install": true }"#).unwrap();
        assert!(config.consume_on_install);
        assert_eq!(config.dispatcher_thread_name, "keyhook-dispatch");
        assert_eq!(config.stats_interval_secs, 30);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = HookConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, HookError::Config(_)));
    }

    #[test]
    fn test_env_override() {
        let mut config = HookConfig::default();
        config.apply_env_overrides(|_| Some("TRUE".to_string()));
        assert!(config.consume_on_install);

        config.apply_env_overrides(|_| Some("0".to_string()));
        assert!(!config.consume_on_install);

        // Garbage leaves the current value alone
        config.apply_env_overrides(|_| Some("maybe".to_string()));
        assert!(!config.consume_on_install);
    }
}
