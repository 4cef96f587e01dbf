//! Configuration management for facetguard.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use facetguard_server::config::FacetGuardConfig;
//!
//! let config = FacetGuardConfig::load("facetguard.yaml")?;
//! ```
//!
//! # Example YAML Configuration
//!
//! ```yaml
//! access:
//!   permission_cache_size: 20000
//!   document_type: hippo:document
//! resolver:
//!   ttl_secs: 86400
//!   domain_locations: ["/hippo:configuration/hippo:domains"]
//! security:
//!   roles:
//!     - name: readonly
//!       privileges: ["jcr:read"]
//!   domains:
//!     - path: /hippo:configuration/hippo:domains/content
//!       auth_roles:
//!         - role: readonly
//!           groups: [everybody]
//!       domain_rules:
//!         - name: documents
//!           facet_rules:
//!             - { facet: nodetype, value: "hippo:document" }
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use facetguard_domain::model::DomainDefinition;
use facetguard_domain::resolver::DEFAULT_DOMAIN_LOCATION;
use facetguard_domain::{EvaluatorConfig, ResolverConfig};
use facetguard_storage::RoleDefinition;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct FacetGuardConfig {
    /// Per-session evaluator settings
    #[serde(default)]
    pub access: AccessSettings,

    /// Shared domain resolver settings
    #[serde(default)]
    pub resolver: ResolverSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Domains, roles and custom privileges
    #[serde(default)]
    pub security: SecuritySettings,
}

/// Access evaluator settings.
///
/// Environment overrides use the `FACETGUARD_ACCESS__` prefix, e.g.
/// `FACETGUARD_ACCESS__PERMISSION_CACHE_SIZE=50000`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AccessSettings {
    #[serde(default = "default_permission_cache_size")]
    pub permission_cache_size: usize,

    #[serde(default = "default_virtual_cache_size")]
    pub virtual_cache_size: usize,

    #[serde(default = "default_type_cache_size")]
    pub type_cache_size: usize,

    /// Node type marking document roots
    #[serde(default = "default_document_type")]
    pub document_type: String,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            permission_cache_size: default_permission_cache_size(),
            virtual_cache_size: default_virtual_cache_size(),
            type_cache_size: default_type_cache_size(),
            document_type: default_document_type(),
        }
    }
}

impl AccessSettings {
    pub fn to_evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig::default()
            .with_permission_cache_size(self.permission_cache_size)
            .with_virtual_cache_size(self.virtual_cache_size)
            .with_type_cache_size(self.type_cache_size)
            .with_document_type(self.document_type.clone())
    }
}

fn default_permission_cache_size() -> usize {
    20_000
}

fn default_virtual_cache_size() -> usize {
    5_000
}

fn default_type_cache_size() -> usize {
    1_000
}

fn default_document_type() -> String {
    facetguard_domain::evaluator::DEFAULT_DOCUMENT_TYPE.to_string()
}

/// Domain resolver settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResolverSettings {
    /// Lifetime of a cached principal resolution, in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Maximum number of cached principal tuples
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,

    /// Configuration paths domains must live below
    #[serde(default = "default_domain_locations")]
    pub domain_locations: Vec<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_capacity: default_max_capacity(),
            domain_locations: default_domain_locations(),
        }
    }
}

impl ResolverSettings {
    pub fn to_resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default()
            .with_ttl(Duration::from_secs(self.ttl_secs))
            .with_max_capacity(self.max_capacity)
            .with_domain_locations(self.domain_locations.iter().cloned())
    }
}

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_capacity() -> u64 {
    10_000
}

fn default_domain_locations() -> Vec<String> {
    vec![DEFAULT_DOMAIN_LOCATION.to_string()]
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// An aggregate privilege registered on top of the standard ones.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AggregateDefinition {
    pub name: String,
    pub members: Vec<String>,
}

/// Raw security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct SecuritySettings {
    #[serde(default)]
    pub domains: Vec<DomainDefinition>,

    #[serde(default)]
    pub roles: Vec<RoleDefinition>,

    /// Leaf privileges beyond the standard set; they become part of `jcr:all`
    #[serde(default)]
    pub privileges: Vec<String>,

    #[serde(default)]
    pub aggregates: Vec<AggregateDefinition>,
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

impl FacetGuardConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `FACETGUARD_` and use `__` as
    /// separator, e.g. `FACETGUARD_RESOLVER__TTL_SECS=3600` overrides
    /// `resolver.ttl_secs`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&FacetGuardConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let loaded: FacetGuardConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&FacetGuardConfig::default())?)
            .add_source(environment())
            .build()?;

        let loaded: FacetGuardConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate the configuration.
    ///
    /// Domains outside the configured locations are not an error here; the
    /// resolver reports and skips them.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let invalid = |message: String| Err(ConfigLoadError::Invalid { message });

        if self.access.permission_cache_size == 0 {
            return invalid("access.permission_cache_size must be greater than 0".to_string());
        }
        if self.access.virtual_cache_size == 0 {
            return invalid("access.virtual_cache_size must be greater than 0".to_string());
        }
        if self.access.document_type.trim().is_empty() {
            return invalid("access.document_type must not be empty".to_string());
        }
        if self.resolver.ttl_secs == 0 {
            return invalid("resolver.ttl_secs must be greater than 0".to_string());
        }
        if self.resolver.domain_locations.is_empty() {
            return invalid("resolver.domain_locations must not be empty".to_string());
        }
        if let Some(location) = self
            .resolver
            .domain_locations
            .iter()
            .find(|l| !l.starts_with('/'))
        {
            return invalid(format!(
                "resolver.domain_locations must be absolute paths, got: {location}"
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            ));
        }

        if let Some(role) = self.security.roles.iter().find(|r| r.name.trim().is_empty()) {
            return invalid(format!(
                "security.roles entries need a name, got privileges {:?}",
                role.privileges
            ));
        }
        if let Some(domain) = self
            .security
            .domains
            .iter()
            .find(|d| !d.path.starts_with('/'))
        {
            return invalid(format!(
                "security.domains paths must be absolute, got: {}",
                domain.path
            ));
        }
        if let Some(aggregate) = self
            .security
            .aggregates
            .iter()
            .find(|a| a.name.trim().is_empty() || a.members.is_empty())
        {
            return invalid(format!(
                "security.aggregates entries need a name and members, got: {:?}",
                aggregate
            ));
        }

        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix("FACETGUARD")
        .prefix_separator("_")
        .separator("__")
}
