use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::channels::telegram::DEFAULT_API_BASE_URL;
use crate::dispatcher::ForwardingConfig;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Mock,
    Stdin,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Mock => write!(f, "mock"),
            SourceKind::Stdin => write!(f, "stdin"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Destination settings to save at launch, replacing what is stored
    #[serde(default)]
    pub forwarding: Option<ForwardingConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// Seconds between synthetic messages (mock source only)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("sms-forwarder.db")
}

fn default_interval_secs() -> u64 {
    30
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl Config {
    /// Load from `path`. A missing file means all defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.source.interval_secs == 0 {
            anyhow::bail!("source.interval_secs must be at least 1");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.store.database_path, PathBuf::from("sms-forwarder.db"));
        assert_eq!(config.source.kind, SourceKind::Mock);
        assert_eq!(config.source.interval_secs, 30);
        assert_eq!(config.telegram.api_base_url, "https://api.telegram.org");
        assert!(config.forwarding.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [store]
            database_path = "/var/lib/sms/forwarder.db"

            [source]
            kind = "stdin"

            [telegram]
            api_base_url = "http://localhost:8081"

            [forwarding]
            restApiEnabled = true
            restApiUrl = "https://example.test/sms"
            restApiHeaders = '{"Authorization": "Bearer abc"}'
            "#,
        )
        .unwrap();

        assert_eq!(config.source.kind, SourceKind::Stdin);
        assert_eq!(config.telegram.api_base_url, "http://localhost:8081");
        let forwarding = config.forwarding.unwrap();
        assert!(forwarding.rest_active());
        assert!(!forwarding.telegram_active());
        assert_eq!(forwarding.rest_api_method, "POST");
        assert!(forwarding.rest_api_headers.contains("Bearer abc"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(Config::parse("[source]\ninterval_secs = 0").is_err());
    }

    #[test]
    fn test_unknown_source_kind_rejected() {
        assert!(Config::parse("[source]\nkind = \"modem\"").is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("sms-forwarder-no-such-config.toml");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.source.kind, SourceKind::Mock);
    }
}
