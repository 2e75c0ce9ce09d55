//! Daemon configuration.
//!
//! Config file: /etc/deskd/config.toml, overridable with --config.
//! Environment overrides: DESKD_BIND, DESKD_DB.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/deskd/config.toml";

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:7070".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/deskd/desk.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Request limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Enable per-peer/per-token rate limiting
    #[serde(default = "default_true")]
    pub rate_limiting: bool,

    /// Retention window for idempotency keys, in seconds
    #[serde(default = "default_idempotency_ttl")]
    pub idempotency_ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_idempotency_ttl() -> u64 {
    60 * 60
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limiting: true,
            idempotency_ttl_secs: default_idempotency_ttl(),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeskConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

impl DeskConfig {
    /// Load from `path` if given, else the default location, else defaults.
    /// Environment variables win over the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse config: {:?}", path))
    }

    fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("DESKD_BIND") {
            self.server.bind = bind;
        }
        if let Ok(db) = std::env::var("DESKD_DB") {
            self.storage.db_path = PathBuf::from(db);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DeskConfig::default();
        assert_eq!(config.server.bind, "127.0.0.1:7070");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(config.limits.rate_limiting);
        assert_eq!(config.limits.idempotency_ttl_secs, 3600);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: DeskConfig = toml::from_str(
            r#"
            [server]
            bind = "0.0.0.0:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.storage.db_path, PathBuf::from("/var/lib/deskd/desk.db"));
    }
}
