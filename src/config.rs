//! Configuration system for the orchestration engine
//!
//! TOML configuration with serde defaults, loaded from an explicit path or
//! the default search locations. The catalog section is optional; omitting
//! it selects the builtin catalog.

use crate::catalog::CatalogConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub billing: BillingSection,
    #[serde(default)]
    pub retention: RetentionSection,
    /// Optional tool/agent catalog override; builtin catalog when absent
    pub catalog: Option<CatalogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Bind address for the task API
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Root directory of the local object store
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Externally reachable base URL presigned URLs are issued against
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Upload URL lifetime (reference value: 15 minutes)
    #[serde(default = "default_upload_url_ttl")]
    pub upload_url_ttl_secs: u64,
    /// Download URL lifetime (reference value: 1 hour)
    #[serde(default = "default_download_url_ttl")]
    pub download_url_ttl_secs: u64,
    /// Largest accepted direct upload
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            public_base_url: default_public_base_url(),
            upload_url_ttl_secs: default_upload_url_ttl(),
            download_url_ttl_secs: default_download_url_ttl(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingSection {
    /// Credits granted to a user on first contact
    #[serde(default = "default_starting_credits")]
    pub starting_credits: u32,
}

impl Default for BillingSection {
    fn default() -> Self {
        Self {
            starting_credits: default_starting_credits(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSection {
    /// Tasks stuck in CREATED/UPLOADING expire after this long
    #[serde(default = "default_abandoned_after")]
    pub abandoned_after_secs: u64,
    /// Terminal tasks keep their artifacts for this long
    #[serde(default = "default_purge_after")]
    pub purge_after_secs: u64,
    /// Sweep cadence
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            abandoned_after_secs: default_abandoned_after(),
            purge_after_secs: default_purge_after(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/objects")
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_upload_url_ttl() -> u64 {
    900 // 15 minutes
}

fn default_download_url_ttl() -> u64 {
    3600 // 1 hour
}

fn default_max_upload_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_starting_credits() -> u32 {
    500
}

fn default_abandoned_after() -> u64 {
    86_400 // 24 hours
}

fn default_purge_after() -> u64 {
    7 * 86_400
}

fn default_sweep_interval() -> u64 {
    3_600
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.storage.public_base_url).map_err(|e| {
            ConfigError::InvalidConfig(format!(
                "storage.public_base_url '{}' is not a URL: {e}",
                self.storage.public_base_url
            ))
        })?;
        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be non-zero".to_string(),
            ));
        }
        if self.storage.upload_url_ttl_secs == 0 || self.storage.download_url_ttl_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "URL lifetimes must be non-zero".to_string(),
            ));
        }
        if self.retention.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "retention.sweep_interval_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed public base URL; valid after `validate`
    pub fn public_base_url(&self) -> Url {
        Url::parse(&self.storage.public_base_url).expect("validated at load time")
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[server]
bind = "127.0.0.1"
port = 8080

[storage]
root = "/tmp/dqflow-test/objects"
public_base_url = "http://localhost:8080"

[billing]
starting_credits = 100
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.upload_url_ttl_secs, 900);
        assert_eq!(config.storage.download_url_ttl_secs, 3600);
        assert_eq!(config.billing.starting_credits, 500);
        assert_eq!(config.retention.abandoned_after_secs, 86_400);
        assert!(config.catalog.is_none());
    }

    #[test]
    fn test_full_config_parses() {
        let toml_content = r#"
[server]
bind = "0.0.0.0"
port = 9000

[storage]
root = "/var/lib/dqflow/objects"
public_base_url = "https://data.example.com"
upload_url_ttl_secs = 600
download_url_ttl_secs = 7200
max_upload_bytes = 1048576

[billing]
starting_credits = 50

[retention]
abandoned_after_secs = 3600
purge_after_secs = 86400
sweep_interval_secs = 300

[catalog.agents.schema-profiler]
credits = 1

[[catalog.tools]]
id = "tiny"
agents = ["schema-profiler"]
required_inputs = ["primary"]
"#;
        let config = toml::from_str::<EngineConfig>(toml_content).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.max_upload_bytes, 1_048_576);
        assert!(config.catalog.is_some());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config: EngineConfig = toml::from_str(
            r#"
[storage]
public_base_url = "not a url"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_port_rejected() {
        let config: EngineConfig = toml::from_str(
            r#"
[server]
port = 0
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_test_config_is_valid() {
        EngineConfig::test_config().validate().unwrap();
    }
}
