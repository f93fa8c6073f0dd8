//! Configuration management for the rsperms service.
//!
//! Settings are layered: built-in defaults, then an optional YAML file,
//! then `RSPERMS_*` environment variables. Later layers win.
//!
//! # Example
//!
//! ```ignore
//! use rsperms_server::{PermissionService, ServerConfig};
//!
//! let config = ServerConfig::load("rsperms.yaml")?;
//! let service = PermissionService::start(config).await?;
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use rsperms_domain::cache::CacheConfig;
use rsperms_domain::model::{InheritanceEdge, Node};
use rsperms_domain::resolver::{DefaultsLayer, ResolverConfig};
use rsperms_domain::{ContextSet, DomainResult};
use serde::{Deserialize, Serialize};

use crate::observability::LoggingConfig;
use crate::rules::DefaultAssignmentRule;

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Session bootstrap settings
    #[serde(default)]
    pub login: LoginSettings,

    /// Computed data cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Resolver settings
    #[serde(default)]
    pub resolver: ResolverSettings,

    /// Audit log settings
    #[serde(default)]
    pub audit: AuditSettings,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session bootstrap settings.
///
/// Environment overrides use the `RSPERMS_LOGIN__` prefix, e.g.
/// `RSPERMS_LOGIN__USE_PLATFORM_IDS=true`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoginSettings {
    /// Treat platform ids as canonical instead of looking them up by name.
    #[serde(default)]
    pub use_platform_ids: bool,

    /// Wait for the identity mapping to be written before continuing.
    #[serde(default = "default_true")]
    pub save_mapping_blocking: bool,

    /// Logins taking at least this long are logged as a warning.
    #[serde(default = "default_slow_login_ms")]
    pub slow_login_warn_ms: u64,

    /// Give users with no parent group the `default` group.
    #[serde(default = "default_true")]
    pub give_default_group: bool,

    /// Rules applied once per login.
    #[serde(default)]
    pub default_assignments: Vec<DefaultAssignmentRule>,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            use_platform_ids: false,
            save_mapping_blocking: true,
            slow_login_warn_ms: default_slow_login_ms(),
            give_default_group: true,
            default_assignments: Vec::new(),
        }
    }
}

impl LoginSettings {
    pub fn slow_login_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_login_warn_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_slow_login_ms() -> u64 {
    1000
}

/// Computed data cache settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,

    /// Snapshot time-to-live in seconds; unset keeps snapshots until
    /// invalidated.
    #[serde(default)]
    pub ttl_secs: Option<u64>,

    #[serde(default = "default_refresh_debounce_ms")]
    pub refresh_debounce_ms: u64,

    /// Interval of the expired-node sweep in seconds; 0 disables it.
    #[serde(default = "default_expiry_sweep_secs")]
    pub expiry_sweep_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
            ttl_secs: None,
            refresh_debounce_ms: default_refresh_debounce_ms(),
            expiry_sweep_secs: default_expiry_sweep_secs(),
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::default()
            .with_max_capacity(self.max_capacity)
            .with_refresh_debounce(Duration::from_millis(self.refresh_debounce_ms));
        if let Some(ttl) = self.ttl_secs {
            config = config.with_ttl(Duration::from_secs(ttl));
        }
        config
    }
}

fn default_max_capacity() -> u64 {
    10_000
}

fn default_refresh_debounce_ms() -> u64 {
    50
}

fn default_expiry_sweep_secs() -> u64 {
    3
}

/// Resolver settings.
///
/// ```yaml
/// resolver:
///   server: lobby
///   collection_defaults:
///     home-limit: "3"
///   service_defaults:
///     chat-color: gray
///   service_default_parents: [default]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ResolverSettings {
    /// Name of this instance, added to every active context as `server=<name>`.
    #[serde(default)]
    pub server: Option<String>,

    /// Meta defaults for users, consulted first after the hierarchy.
    #[serde(default)]
    pub collection_defaults: BTreeMap<String, String>,

    /// Service-wide meta defaults, consulted last.
    #[serde(default)]
    pub service_defaults: BTreeMap<String, String>,

    /// Groups every user reports as a parent.
    #[serde(default)]
    pub collection_default_parents: Vec<String>,

    /// Groups every subject reports as a parent.
    #[serde(default)]
    pub service_default_parents: Vec<String>,
}

impl ResolverSettings {
    pub fn to_resolver_config(&self) -> ResolverConfig {
        fn layer(values: &BTreeMap<String, String>, parents: &[String]) -> DefaultsLayer {
            DefaultsLayer::new(values.iter().map(|(k, v)| Node::meta(k, v)).collect())
                .with_parents(parents.iter().map(InheritanceEdge::new).collect())
        }
        ResolverConfig::default()
            .with_collection_defaults(layer(
                &self.collection_defaults,
                &self.collection_default_parents,
            ))
            .with_service_defaults(layer(&self.service_defaults, &self.service_default_parents))
    }

    /// The static context of this instance.
    pub fn static_context(&self) -> DomainResult<ContextSet> {
        match &self.server {
            Some(server) => ContextSet::from_pairs([("server", server.as_str())]),
            None => Ok(ContextSet::empty()),
        }
    }
}

/// Audit log settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AuditSettings {
    /// Entries per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Also append entries to storage.
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            persist: true,
        }
    }
}

fn default_page_size() -> usize {
    10
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type. Only "memory" ships with this crate.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `RSPERMS_` and use `__` as separator.
    /// For example:
    /// - `RSPERMS_CACHE__MAX_CAPACITY=500` overrides `cache.max_capacity`
    /// - `RSPERMS_LOGGING__LEVEL=debug` overrides `logging.level`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(Self::environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(Self::environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    // RSPERMS_CACHE__MAX_CAPACITY -> cache.max_capacity
    fn environment() -> Environment {
        Environment::with_prefix("RSPERMS")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.cache.max_capacity == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "cache.max_capacity must be greater than 0".to_string(),
            });
        }

        if self.cache.ttl_secs == Some(0) {
            return Err(ConfigLoadError::Invalid {
                message: "cache.ttl_secs must be greater than 0 when set".to_string(),
            });
        }

        if self.audit.page_size == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "audit.page_size must be greater than 0".to_string(),
            });
        }

        if let Err(err) = self.resolver.static_context() {
            return Err(ConfigLoadError::Invalid {
                message: format!("resolver.server: {err}"),
            });
        }

        let valid_backends = ["memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "storage.backend must be one of: {:?}, got: {}",
                    valid_backends, self.storage.backend
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }
}
