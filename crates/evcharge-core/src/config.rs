//! Application configuration management.
//!
//! Configuration is read from `~/.config/evcharge/config.json` when present,
//! then overridden by `EVCHARGE_*` environment variables. Every field has a
//! default matching the TDX reference deployment, so an empty file (or no
//! file) plus a client id and secret is a working setup.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::auth::SecretStore;
use crate::auth::token::TOKEN_CACHE_KEY;
use crate::models::region::city_endpoint;
use crate::models::{default_regions, Region, RegionSet};

/// Application name used for the config directory path
const APP_NAME: &str = "evcharge";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_AUTH_URL: &str =
    "https://tdx.transportdata.tw/auth/realms/TDXConnect/protocol/openid-connect/token";
pub const DEFAULT_API_BASE_URL: &str = "https://tdx.transportdata.tw/api/basic/v1/EV/ChargingPoint";

const ENV_CLIENT_ID: &str = "EVCHARGE_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "EVCHARGE_CLIENT_SECRET";
const ENV_AUTH_URL: &str = "EVCHARGE_AUTH_URL";
const ENV_API_BASE_URL: &str = "EVCHARGE_API_BASE_URL";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("No client id configured (set EVCHARGE_CLIENT_ID or client_id in the config file)")]
    MissingClientId,

    #[error("No client secret for {0} (set EVCHARGE_CLIENT_SECRET or run `evcharge login`)")]
    MissingClientSecret(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Region {0:?} is defined more than once")]
    DuplicateRegion(String),
}

/// A region entry as written in the config file.
///
/// `endpoint` overrides the URL derived from `api_base_url` and `code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Application id and secret for the client-credentials exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"****")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client_id: Option<String>,
    /// Never written back to disk; prefer the keychain or the environment.
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub api_base_url: String,
    /// `$top` value sent with every region request.
    pub page_size: u32,
    /// Empty means the six default cities.
    pub regions: Vec<RegionConfig>,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            page_size: 30,
            regions: Vec::new(),
            cache_capacity: 100,
            cache_ttl_secs: 600,
            max_attempts: 3,
            retry_backoff_ms: 2000,
            request_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            debug!(path = %path.display(), "Loaded config");
            Ok(config)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Write the config to `path`. The client secret is never written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `EVCHARGE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(id) = lookup(ENV_CLIENT_ID) {
            self.client_id = Some(id);
        }
        if let Some(secret) = lookup(ENV_CLIENT_SECRET) {
            self.client_secret = Some(secret);
        }
        if let Some(url) = lookup(ENV_AUTH_URL) {
            self.auth_url = url;
        }
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            self.api_base_url = url;
        }
    }

    /// Check structural constraints. Credentials are checked separately by
    /// [`Config::credentials`] since some commands run without them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| ConfigError::InvalidValue {
            field,
            reason: reason.to_string(),
        };
        if self.cache_capacity == 0 {
            return Err(invalid("cache_capacity", "must be at least 1"));
        }
        if self.cache_ttl_secs == 0 {
            return Err(invalid("cache_ttl_secs", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be at least 1"));
        }
        if self.page_size == 0 {
            return Err(invalid("page_size", "must be at least 1"));
        }
        if self.auth_url.trim().is_empty() {
            return Err(invalid("auth_url", "must not be empty"));
        }

        let mut seen = HashSet::new();
        for region in &self.regions {
            if region.code.eq_ignore_ascii_case(TOKEN_CACHE_KEY) {
                return Err(invalid("regions", "code collides with the token cache key"));
            }
            if region.name.trim().is_empty() || region.code.trim().is_empty() {
                return Err(invalid("regions", "name and code must not be empty"));
            }
            for id in [region.name.clone(), region.code.to_ascii_lowercase()] {
                if !seen.insert(id.clone()) {
                    return Err(ConfigError::DuplicateRegion(id));
                }
            }
        }
        Ok(())
    }

    /// Resolve client id and secret. The secret comes from the config or
    /// environment first, then from the OS keychain.
    pub fn credentials(&self) -> Result<ClientCredentials, ConfigError> {
        let client_id = self
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::MissingClientId)?;

        let client_secret = match self.client_secret.clone().filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => SecretStore::get_secret(&client_id).map_err(|e| {
                debug!(error = %e, "No secret in keychain");
                ConfigError::MissingClientSecret(client_id.clone())
            })?,
        };

        Ok(ClientCredentials {
            client_id,
            client_secret,
        })
    }

    /// The configured regions with endpoints resolved.
    pub fn region_set(&self) -> RegionSet {
        if self.regions.is_empty() {
            return RegionSet::new(default_regions(&self.api_base_url, self.page_size));
        }
        let regions = self
            .regions
            .iter()
            .map(|rc| Region {
                name: rc.name.clone(),
                code: rc.code.clone(),
                latitude: rc.latitude,
                longitude: rc.longitude,
                endpoint: rc
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| city_endpoint(&self.api_base_url, &rc.code, self.page_size)),
            })
            .collect();
        RegionSet::new(regions)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn region(name: &str, code: &str) -> RegionConfig {
        RegionConfig {
            name: name.to_string(),
            code: code.to_string(),
            latitude: 25.0,
            longitude: 121.5,
            endpoint: None,
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.cache_ttl(), Duration::from_secs(600));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_backoff(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
        assert_eq!(config.region_set().len(), 6);
    }

    #[test]
    fn test_parse_partial_file() {
        let json = r#"{"client_id": "app-1", "cache_ttl_secs": 60, "page_size": 50}"#;
        let config: Config = serde_json::from_str(json).expect("Failed to parse partial config");
        assert_eq!(config.client_id.as_deref(), Some("app-1"));
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.max_attempts, 3);

        let taipei = config.region_set();
        let taipei = taipei.resolve("Taipei").expect("default region present");
        assert!(taipei.endpoint.ends_with("/City/Taipei?$top=50&$format=JSON"));
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("evcharge-test-does-not-exist/config.json");
        let config = Config::load_from(&path).expect("missing file should not fail");
        assert_eq!(config.auth_url, DEFAULT_AUTH_URL);
    }

    #[test]
    fn test_save_to_then_load_from() {
        let dir = std::env::temp_dir().join(format!("evcharge-config-test-{}", std::process::id()));
        let path = dir.join("nested").join("config.json");
        let config = Config {
            client_id: Some("saved-id".to_string()),
            client_secret: Some("s3cret".to_string()),
            cache_ttl_secs: 120,
            ..Config::default()
        };
        config.save_to(&path).expect("Failed to save config");

        let written = std::fs::read_to_string(&path).expect("config file written");
        assert!(!written.contains("s3cret"));

        let loaded = Config::load_from(&path).expect("Failed to load saved config");
        assert_eq!(loaded.client_id.as_deref(), Some("saved-id"));
        assert_eq!(loaded.client_secret, None);
        assert_eq!(loaded.cache_ttl_secs, 120);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_secret_never_serialized() {
        let config = Config {
            client_secret: Some("s3cret".to_string()),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).expect("Failed to serialize config");
        assert!(!json.contains("s3cret"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_CLIENT_ID, "env-id"),
            (ENV_CLIENT_SECRET, "env-secret"),
            (ENV_API_BASE_URL, "http://localhost:9999"),
            (ENV_AUTH_URL, "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.client_id.as_deref(), Some("env-id"));
        assert_eq!(config.api_base_url, "http://localhost:9999");
        // Blank values are ignored
        assert_eq!(config.auth_url, DEFAULT_AUTH_URL);

        let creds = config.credentials().expect("credentials from env");
        assert_eq!(creds.client_secret, "env-secret");
        assert!(!format!("{:?}", creds).contains("env-secret"));
    }

    #[test]
    fn test_missing_client_id() {
        let config = Config::default();
        assert_eq!(config.credentials(), Err(ConfigError::MissingClientId));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            cache_capacity: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "cache_capacity", .. })
        ));

        let config = Config {
            max_attempts: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "max_attempts", .. })
        ));
    }

    #[test]
    fn test_validate_regions() {
        let config = Config {
            regions: vec![region("台北市", "Taipei"), region("臺北市", "TAIPEI")],
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateRegion("taipei".to_string()))
        );

        let config = Config {
            regions: vec![region("Token", "access_token")],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_region_endpoint_override() {
        let mut custom = region("測試市", "Test");
        custom.endpoint = Some("http://localhost:1/custom".to_string());
        let config = Config {
            regions: vec![custom, region("台南市", "Tainan")],
            ..Config::default()
        };
        let set = config.region_set();
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.resolve("Test").map(|r| r.endpoint.as_str()),
            Some("http://localhost:1/custom")
        );

        let expected = format!("{}/City/Tainan?$top=30&$format=JSON", DEFAULT_API_BASE_URL);
        assert_eq!(
            set.resolve("台南市").map(|r| r.endpoint.as_str()),
            Some(expected.as_str())
        );
    }
}
