use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: PermissionCacheConfig,
    pub logging: LoggingConfig,
}

/// Tuning for the per-planet permission caches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionCacheConfig {
    /// Number of lock stripes in the inverse indices (0 = available parallelism)
    pub stripe_count: usize,
    /// Max entries per channel-type permission cache
    pub channel_cache_capacity: u64,
    /// Max entries in the authority, planet-permission and access caches
    pub combo_cache_capacity: u64,
    /// Max number of idle access lists kept for reuse
    pub access_list_pool_size: usize,
    /// Deduplicate concurrent computations for the same cold key
    pub single_flight: bool,
    /// Channel-access recomputations before returning an uncached result
    pub max_access_attempts: u32,
    /// Upper bound on parent hops when resolving inherited permissions
    pub max_inheritance_depth: usize,
}

impl Default for PermissionCacheConfig {
    fn default() -> Self {
        Self {
            stripe_count: 0,
            channel_cache_capacity: 1_000_000,
            combo_cache_capacity: 100_000,
            access_list_pool_size: 64,
            single_flight: false,
            max_access_attempts: 2,
            max_inheritance_depth: 64,
        }
    }
}

impl PermissionCacheConfig {
    /// Stripe count with the "auto" value resolved
    #[must_use]
    pub fn effective_stripe_count(&self) -> usize {
        if self.stripe_count > 0 {
            return self.stripe_count;
        }
        std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line, for log shippers
    Json,
    /// Multi-line human-readable output
    #[default]
    Pretty,
    /// Single-line human-readable output
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file_path: Option<String>,
    /// Log every cache discard and invalidation at debug level, regardless
    /// of `level`
    pub cache_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file_path: None,
            cache_events: false,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // PLANETPERM_CACHE__SINGLE_FLIGHT, PLANETPERM_LOGGING__LEVEL, ...
        builder = builder.add_source(
            Environment::with_prefix("PLANETPERM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }
}
