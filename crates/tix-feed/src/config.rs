//! Feed configuration
//!
//! Loaded from TOML, overridable from `TIXFEED_*` environment variables.

use crate::error::ConfigError;
use crate::resolver::DEFAULT_CACHE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound on concurrent metadata fetches
pub const MAX_FETCH_CONCURRENCY: usize = 16;

/// Feed configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Block explorer base; transaction links are `<base>/tx/<hash>`
    pub explorer_base_url: String,
    /// Concurrent metadata fetches per pass (1..=16)
    pub fetch_concurrency: usize,
    /// Documents kept by the metadata resolver
    pub metadata_cache_capacity: u64,
    /// Audit log file
    pub audit_log_path: PathBuf,
}

impl FeedConfig {
    /// Create configuration with defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` on malformed TOML and
    /// `ConfigError::Invalid` on out-of-range values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file, then apply environment overrides
    ///
    /// # Errors
    /// Returns `ConfigError::Read` if the file cannot be read, otherwise as
    /// [`FeedConfig::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)?.with_env_overrides()
    }

    /// Apply `TIXFEED_EXPLORER_BASE_URL`, `TIXFEED_FETCH_CONCURRENCY`,
    /// `TIXFEED_CACHE_CAPACITY` and `TIXFEED_AUDIT_LOG`
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if an override does not parse
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup("TIXFEED_EXPLORER_BASE_URL") {
            self.explorer_base_url = url;
        }
        if let Some(value) = lookup("TIXFEED_FETCH_CONCURRENCY") {
            self.fetch_concurrency = value.parse().map_err(|_| ConfigError::Invalid {
                field: "fetch_concurrency",
                reason: format!("not a number: {value}"),
            })?;
        }
        if let Some(value) = lookup("TIXFEED_CACHE_CAPACITY") {
            self.metadata_cache_capacity = value.parse().map_err(|_| ConfigError::Invalid {
                field: "metadata_cache_capacity",
                reason: format!("not a number: {value}"),
            })?;
        }
        if let Some(path) = lookup("TIXFEED_AUDIT_LOG") {
            self.audit_log_path = PathBuf::from(path);
        }
        self.validate()?;
        Ok(self)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.explorer_base_url.trim();
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                field: "explorer_base_url",
                reason: format!("expected an http(s) URL, got {base:?}"),
            });
        }
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "fetch_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.metadata_cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "metadata_cache_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Fetch concurrency clamped to the supported range
    #[inline]
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.fetch_concurrency.clamp(1, MAX_FETCH_CONCURRENCY)
    }

    /// Set explorer base URL
    #[inline]
    #[must_use]
    pub fn with_explorer_base_url(mut self, url: impl Into<String>) -> Self {
        self.explorer_base_url = url.into();
        self
    }

    /// Set fetch concurrency
    #[inline]
    #[must_use]
    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency;
        self
    }

    /// Set metadata cache capacity
    #[inline]
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.metadata_cache_capacity = capacity;
        self
    }

    /// Set audit log path
    #[inline]
    #[must_use]
    pub fn with_audit_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log_path = path.into();
        self
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            explorer_base_url: "https://sepolia.etherscan.io".to_string(),
            fetch_concurrency: 8,
            metadata_cache_capacity: DEFAULT_CACHE_CAPACITY,
            audit_log_path: PathBuf::from("tixfeed-audit.jsonl"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = FeedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fetch_concurrency, 8);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = FeedConfig::from_toml_str("fetch_concurrency = 12\n").unwrap();
        assert_eq!(config.fetch_concurrency, 12);
        assert_eq!(config.explorer_base_url, "https://sepolia.etherscan.io");
    }

    #[test]
    fn concurrency_is_clamped() {
        let config = FeedConfig::new().with_fetch_concurrency(64);
        assert_eq!(config.effective_concurrency(), MAX_FETCH_CONCURRENCY);
    }

    #[test]
    fn zero_concurrency_is_invalid() {
        let err = FeedConfig::from_toml_str("fetch_concurrency = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "fetch_concurrency",
                ..
            }
        ));
    }

    #[test]
    fn explorer_must_be_http() {
        let err = FeedConfig::from_toml_str("explorer_base_url = \"ftp://x\"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "explorer_base_url",
                ..
            }
        ));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            FeedConfig::from_toml_str("fetch_concurrency = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TIXFEED_EXPLORER_BASE_URL", "http://localhost:4000"),
            ("TIXFEED_FETCH_CONCURRENCY", "4"),
            ("TIXFEED_AUDIT_LOG", "/tmp/audit.jsonl"),
        ]);
        let config = FeedConfig::new()
            .with_overrides(|key| env.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.explorer_base_url, "http://localhost:4000");
        assert_eq!(config.fetch_concurrency, 4);
        assert_eq!(config.audit_log_path, PathBuf::from("/tmp/audit.jsonl"));
    }

    #[test]
    fn bad_override_is_invalid() {
        let result = FeedConfig::new().with_overrides(|key| {
            (key == "TIXFEED_CACHE_CAPACITY").then(|| "lots".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "metadata_cache_capacity",
                ..
            })
        ));
    }
}
