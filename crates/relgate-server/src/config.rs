//! Configuration management for the relgate server.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```yaml
//! logging:
//!   level: debug
//! resolver:
//!   fetch_timeout_ms: 2000
//! catalog:
//!   products:
//!     - key: soccerBall
//!       parents: [toys, balls, sport]
//!   categories:
//!     - key: balls
//!       parents: [group-a-1, group-b]
//! rules:
//!   - path: /categories/balls
//!     type: category
//!     allowed: [balls]
//! checks:
//!   - path: /categories/balls
//!     groups: [group-b]
//! ```
//!
//! Catalog entries are lists rather than maps because configuration keys
//! are case-folded on load, while product and category names are not.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use relgate_domain::model::{AccessEntry, RawRelationshipChange, RuleType};
use relgate_domain::{CacheConfig, ResolverConfig, StaticGraphFetcher};

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Resolver and warm-up settings
    #[serde(default)]
    pub resolver: ResolverSettings,

    /// Relationship cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Fixed catalog served by the graph fetcher
    #[serde(default)]
    pub catalog: CatalogSettings,

    /// Access rules installed at startup
    #[serde(default)]
    pub rules: Vec<AccessEntry>,

    /// Relationship changes fed to the ingestor, in order
    #[serde(default)]
    pub changes: Vec<ScheduledChange>,

    /// Access checks evaluated before and after the changes
    #[serde(default)]
    pub checks: Vec<AccessCheck>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,

    /// Also log span enter/exit, e.g. around each rule installation
    #[serde(default)]
    pub spans: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            spans: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolver settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResolverSettings {
    /// Upper bound on one graph fetch, in milliseconds
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Warm-up fetches in flight at once
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Fetch products missing from the cache at check time
    #[serde(default = "default_true")]
    pub lazy_product_fetch: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            lazy_product_fetch: true,
        }
    }
}

impl ResolverSettings {
    pub fn to_resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default()
            .with_fetch_timeout(Duration::from_millis(self.fetch_timeout_ms))
            .with_max_concurrent_fetches(self.max_concurrent_fetches)
            .with_lazy_product_fetch(self.lazy_product_fetch)
    }
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_max_concurrent_fetches() -> usize {
    16
}

fn default_true() -> bool {
    true
}

/// Relationship cache settings.
///
/// Environment variable: `RELGATE_CACHE__PENDING_RETENTION_MS`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// Keep changes for not-yet-cached keys this long and replay them on
    /// population. Unset drops them.
    #[serde(default)]
    pub pending_retention_ms: Option<u64>,

    /// Buffered changes kept per key
    #[serde(default = "default_max_pending_per_key")]
    pub max_pending_per_key: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            pending_retention_ms: None,
            max_pending_per_key: default_max_pending_per_key(),
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        let config = CacheConfig::default().with_max_pending_per_key(self.max_pending_per_key);
        match self.pending_retention_ms {
            Some(ms) => config.with_pending_retention(Duration::from_millis(ms)),
            None => config,
        }
    }
}

fn default_max_pending_per_key() -> usize {
    64
}

/// One key of the fixed catalog and its parents.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CatalogEntry {
    pub key: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

/// The fixed catalog behind the graph fetcher.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CatalogSettings {
    /// Product → categories
    #[serde(default)]
    pub products: Vec<CatalogEntry>,

    /// Category → groups
    #[serde(default)]
    pub categories: Vec<CatalogEntry>,
}

impl CatalogSettings {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.categories.is_empty()
    }

    /// Builds the fetcher. Later duplicates of a key replace earlier ones.
    pub fn to_fetcher(&self) -> StaticGraphFetcher {
        fn table(entries: &[CatalogEntry]) -> HashMap<String, Vec<String>> {
            entries
                .iter()
                .map(|entry| (entry.key.clone(), entry.parents.clone()))
                .collect()
        }
        StaticGraphFetcher::from_tables(table(&self.products), table(&self.categories))
    }
}

/// A relationship change and how long to wait before sending it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ScheduledChange {
    #[serde(default)]
    pub delay_ms: u64,
    pub event: RawRelationshipChange,
}

/// An access check to evaluate.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AccessCheck {
    pub path: String,
    #[serde(default)]
    pub groups: Vec<String>,
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
    /// Environment variables are prefixed with `RELGATE_` and use `__` as separator.
    /// For example:
    /// - `RELGATE_LOGGING__LEVEL=debug` overrides `logging.level`
    /// - `RELGATE_RESOLVER__FETCH_TIMEOUT_MS=500` overrides `resolver.fetch_timeout_ms`
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
            .add_source(
                Environment::with_prefix("RELGATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(
                Environment::with_prefix("RELGATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// The built-in demonstration: a small toy catalog, three rules, two
    /// relationship deletions and checks for a user in `group-b`.
    pub fn demo() -> Self {
        let entry = |key: &str, parents: &[&str]| CatalogEntry {
            key: key.to_string(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
        };
        let change = |delay_ms, kind: &str, item: &str, parent: &str| ScheduledChange {
            delay_ms,
            event: RawRelationshipChange {
                item: item.to_string(),
                parent: parent.to_string(),
                kind: kind.to_string(),
                action: "delete".to_string(),
            },
        };
        let check = |path: &str| AccessCheck {
            path: path.to_string(),
            groups: vec!["group-b".to_string()],
        };

        Self {
            catalog: CatalogSettings {
                products: vec![
                    entry("soccerBall", &["toys", "balls", "sport"]),
                    entry("teddyBear", &["toys"]),
                ],
                categories: vec![
                    entry("balls", &["group-a-1", "group-b"]),
                    entry("toys", &["group-b", "group-c"]),
                ],
            },
            rules: vec![
                AccessEntry::new(
                    "/landing-page-for-client-a",
                    RuleType::Group,
                    ["group-a-1", "group-a-2"],
                ),
                AccessEntry::new("/categories/balls", RuleType::Category, ["balls"]),
                AccessEntry::new("/products/soccerBall", RuleType::Product, ["soccerBall"]),
            ],
            changes: vec![
                change(0, "product", "teddyBear", "toys"),
                change(1000, "category", "balls", "group-b"),
            ],
            checks: vec![
                check("/landing-page-for-client-a"),
                check("/categories/balls"),
                check("/products/soccerBall"),
            ],
            ..Default::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        if self.resolver.fetch_timeout_ms == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "resolver.fetch_timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.resolver.max_concurrent_fetches == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "resolver.max_concurrent_fetches must be greater than 0".to_string(),
            });
        }

        if self.cache.max_pending_per_key == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "cache.max_pending_per_key must be greater than 0".to_string(),
            });
        }

        if let Some(index) = self.rules.iter().position(|rule| rule.path.is_empty()) {
            return Err(ConfigLoadError::Invalid {
                message: format!("rules[{index}].path must not be empty"),
            });
        }

        Ok(())
    }
}
