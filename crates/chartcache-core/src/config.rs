//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the chart API location and the cache tuning knobs.
//!
//! Configuration is stored at `~/.config/chartcache/config.json`. The API
//! location and token can be overridden with `CHARTCACHE_API_URL` and
//! `CHARTCACHE_API_TOKEN`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "chartcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Entries older than one hour are refetched.
const DEFAULT_TTL_MS: u64 = 60 * 60 * 1000;

/// Newest entries kept when the persistent tier is trimmed.
const DEFAULT_MAX_PERSISTENT_ENTRIES: usize = 50;

const DEFAULT_NAMESPACE_PREFIX: &str = "chart-cache-";

/// Roughly what a browser grants local storage per origin.
const DEFAULT_CAPACITY_BYTES: u64 = 5 * 1024 * 1024;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

pub const ENV_API_URL: &str = "CHARTCACHE_API_URL";
pub const ENV_API_TOKEN: &str = "CHARTCACHE_API_TOKEN";

/// Tuning for one `TieredCache` instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Expiration window in milliseconds.
    pub ttl_ms: u64,
    /// How many namespaced entries the persistent tier may hold.
    pub max_persistent_entries: usize,
    /// Prefix scoping this cache's keys within a shared store.
    pub namespace_prefix: String,
    /// Byte budget of the persistent medium; `None` for unbounded.
    pub capacity_bytes: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            max_persistent_entries: DEFAULT_MAX_PERSISTENT_ENTRIES,
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            capacity_bytes: Some(DEFAULT_CAPACITY_BYTES),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        i64::try_from(self.ttl_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub cache: CacheConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            cache: CacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Overlay values from a variable lookup (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|s| !s.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|s| !s.trim().is_empty()) {
            self.api_token = Some(token.trim().to_string());
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl(), Duration::hours(1));
        assert_eq!(config.max_persistent_entries, 50);
        assert_eq!(config.namespace_prefix, "chart-cache-");
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let config = CacheConfig {
            ttl_ms: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.ttl(), Duration::MAX);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::load_from(&temp_dir.path().join("config.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.api_base_url = "https://charts.example.com".to_string();
        config.cache.ttl_ms = 30_000;
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"cache": {"max_persistent_entries": 10}}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.cache.max_persistent_entries, 10);
        assert_eq!(config.cache.ttl_ms, DEFAULT_TTL_MS);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(|name| match name {
            ENV_API_URL => Some(" https://api.example.com ".to_string()),
            ENV_API_TOKEN => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.api_token, None);
    }
}
