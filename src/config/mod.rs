//! Configuration management.

use crate::models::TtlTier;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration for concord.
#[derive(Debug, Clone)]
pub struct ConcordConfig {
    /// Backend connection URL (`redis://...`); `None` selects the in-process backend.
    pub backend_url: Option<String>,
    /// Root namespace every key lives under.
    pub namespace: String,
    /// Local read-cache capacity in entries.
    pub cache_capacity: usize,
    /// Retry budget for compare-and-swap cycles in the transaction layer.
    pub cas_retries: u32,
    /// Default stream length cap before trimming.
    pub stream_max_len: usize,
    /// Poll interval for the pub/sub dispatcher shutdown check.
    pub poll_interval: Duration,
    /// TTL tier durations.
    pub ttl: TtlSettings,
}

/// Durations backing each TTL tier.
#[derive(Debug, Clone)]
pub struct TtlSettings {
    /// Duration for [`TtlTier::Ephemeral`].
    pub ephemeral: Duration,
    /// Duration for [`TtlTier::WorkingResults`].
    pub working_results: Duration,
    /// Duration for [`TtlTier::SessionState`].
    pub session_state: Duration,
}

impl Default for TtlSettings {
    fn default() -> Self {
        Self {
            ephemeral: Duration::from_secs(300),
            working_results: Duration::from_secs(3600),
            session_state: Duration::from_secs(86_400),
        }
    }
}

impl TtlSettings {
    /// Resolves a tier to its configured duration; `Durable` has none.
    #[must_use]
    pub const fn resolve(&self, tier: TtlTier) -> Option<Duration> {
        match tier {
            TtlTier::Ephemeral => Some(self.ephemeral),
            TtlTier::WorkingResults => Some(self.working_results),
            TtlTier::SessionState => Some(self.session_state),
            TtlTier::Durable => None,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Backend connection URL.
    pub backend_url: Option<String>,
    /// Root namespace.
    pub namespace: Option<String>,
    /// Cache capacity in entries.
    pub cache_capacity: Option<usize>,
    /// CAS retry budget.
    pub cas_retries: Option<u32>,
    /// Default stream length cap.
    pub stream_max_len: Option<usize>,
    /// TTL tier section.
    pub ttl: Option<ConfigFileTtl>,
}

/// TTL section in the config file, in seconds.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileTtl {
    /// Ephemeral tier seconds.
    pub ephemeral_secs: Option<u64>,
    /// Working-results tier seconds.
    pub working_results_secs: Option<u64>,
    /// Session-state tier seconds.
    pub session_state_secs: Option<u64>,
}

impl Default for ConcordConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            namespace: "concord".to_string(),
            cache_capacity: 1024,
            cas_retries: 5,
            stream_max_len: 1000,
            poll_interval: Duration::from_millis(100),
            ttl: TtlSettings::default(),
        }
    }
}

impl ConcordConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/concord/` on macOS)
    /// 2. XDG config dir (`~/.config/concord/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs.config_dir().join("concord").join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("concord")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `ConcordConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(url) = file.backend_url {
            config.backend_url = Some(url);
        }
        if let Some(namespace) = file.namespace {
            config.namespace = namespace;
        }
        if let Some(capacity) = file.cache_capacity {
            config.cache_capacity = capacity;
        }
        if let Some(retries) = file.cas_retries {
            config.cas_retries = retries;
        }
        if let Some(max_len) = file.stream_max_len {
            config.stream_max_len = max_len;
        }
        if let Some(ttl) = file.ttl {
            if let Some(secs) = ttl.ephemeral_secs {
                config.ttl.ephemeral = Duration::from_secs(secs);
            }
            if let Some(secs) = ttl.working_results_secs {
                config.ttl.working_results = Duration::from_secs(secs);
            }
            if let Some(secs) = ttl.session_state_secs {
                config.ttl.session_state = Duration::from_secs(secs);
            }
        }

        config
    }

    /// Sets the backend URL.
    #[must_use]
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }

    /// Sets the root namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the cache capacity.
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the TTL durations.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: TtlSettings) -> Self {
        self.ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ConcordConfig::default();
        assert_eq!(config.namespace, "concord");
        assert_eq!(config.cache_capacity, 1024);
        assert_eq!(
            config.ttl.resolve(TtlTier::WorkingResults),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(config.ttl.resolve(TtlTier::Durable), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
namespace = "fleet-7"
cache_capacity = 64
cas_retries = 9

[ttl]
working_results_secs = 120
"#
        )
        .unwrap();

        let config = ConcordConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.namespace, "fleet-7");
        assert_eq!(config.cache_capacity, 64);
        assert_eq!(config.cas_retries, 9);
        assert_eq!(config.ttl.working_results, Duration::from_secs(120));
        // Unset keys keep defaults
        assert_eq!(config.ttl.ephemeral, Duration::from_secs(300));
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = ConcordConfig::load_from_file(std::path::Path::new("/nonexistent/concord.toml"));
        assert!(result.is_err());
    }
}
