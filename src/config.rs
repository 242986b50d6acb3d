//! Service configuration
//!
//! Loaded once at startup from a TOML file, then environment overrides are
//! applied on top. The definition-endpoint override in particular is resolved
//! here and passed into the pipeline at construction, never read mid-request.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::HookError;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
pub const DEFAULT_DATABASE_PATH: &str = "hook.db";
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Deserialize)]
pub struct HookConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Hosting-service endpoint for definition fetches. Unset means the
    /// host segment of each repository URL is used.
    #[serde(default)]
    pub definition_endpoint: Option<String>,
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_database_path() -> String {
    DEFAULT_DATABASE_PATH.to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            database_path: default_database_path(),
            workers: default_workers(),
            definition_endpoint: None,
        }
    }
}

impl HookConfig {
    /// Load the configuration file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HookError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let config_str = fs::read_to_string(path).map_err(|e| {
            HookError::ConfigError(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, HookError> {
        toml::from_str(raw).map_err(|e| {
            HookError::ConfigError(format!("Failed to parse config file: {}", e))
        })
    }

    /// Apply environment overrides. Takes the lookup as a closure so the
    /// override logic is testable without touching the process environment.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("BIND_ADDRESS") {
            self.bind_address = addr;
        }
        if let Some(path) = var("DATABASE_PATH") {
            self.database_path = path;
        }
        if let Some(workers) = var("WORKERS").and_then(|w| w.parse().ok()) {
            self.workers = workers;
        }
        if let Some(endpoint) = var("GOGS_URL").filter(|e| !e.is_empty()) {
            self.definition_endpoint = Some(endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = HookConfig::load("/definitely/not/here.toml").unwrap();
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert!(config.definition_endpoint.is_none());
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config = HookConfig::from_toml_str("workers = 8\n").unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.database_path, DEFAULT_DATABASE_PATH);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = HookConfig::from_toml_str("workers = \"ten\"").unwrap_err();
        assert!(matches!(err, HookError::ConfigError(_)));
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut config = HookConfig::from_toml_str(
            "bind_address = \"0.0.0.0:9000\"\ndefinition_endpoint = \"gogs.file:3000\"\n",
        )
        .unwrap();

        config.apply_env_overrides(|key| match key {
            "GOGS_URL" => Some("gogs.env:3000".to_string()),
            "WORKERS" => Some("2".to_string()),
            _ => None,
        });

        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.workers, 2);
        assert_eq!(
            config.definition_endpoint.as_deref(),
            Some("gogs.env:3000")
        );
    }

    #[test]
    fn empty_endpoint_override_is_ignored() {
        let mut config = HookConfig::default();
        config.apply_env_overrides(|key| (key == "GOGS_URL").then(String::new));
        assert!(config.definition_endpoint.is_none());
    }
}
