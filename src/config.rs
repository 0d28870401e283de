//! TOML configuration. Every field has a default, so an empty file works.

use crate::location::augment::AugmentOptions;
use crate::location::providers::{DEFAULT_ENDPOINT, DEFAULT_USER_AGENT};
use crate::location::rank::RankLimits;
use crate::location::ResolverSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub resolve: ResolveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests per client per minute; 0 disables the limiter.
    pub rate_limit_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            rate_limit_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub primary_timeout_ms: u64,
    pub supplementary_timeout_ms: u64,
    pub primary_count: usize,
    pub supplementary_count: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            user_agent: DEFAULT_USER_AGENT.into(),
            primary_timeout_ms: 10_000,
            supplementary_timeout_ms: 8_000,
            primary_count: 50,
            supplementary_count: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    /// Also sent as `Cache-Control: max-age` on successful searches.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub budget_ms: u64,
    pub concurrency: usize,
    pub country_target: usize,
    pub city_limit: usize,
    pub max_static_lookups: usize,
    pub min_population: u64,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            budget_ms: 10_000,
            concurrency: 3,
            country_target: 25,
            city_limit: 15,
            max_static_lookups: 10,
            min_population: 1000,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::Invalid { field, message: "must be greater than zero".into() });
            }
            Ok(())
        }

        if self.upstream.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "upstream.endpoint",
                message: "must not be empty".into(),
            });
        }
        positive("upstream.primary_timeout_ms", self.upstream.primary_timeout_ms)?;
        positive("upstream.supplementary_timeout_ms", self.upstream.supplementary_timeout_ms)?;
        positive("upstream.primary_count", self.upstream.primary_count as u64)?;
        positive("upstream.supplementary_count", self.upstream.supplementary_count as u64)?;
        positive("cache.capacity", self.cache.capacity as u64)?;
        positive("cache.ttl_secs", self.cache.ttl_secs)?;
        positive("resolve.budget_ms", self.resolve.budget_ms)?;
        positive("resolve.concurrency", self.resolve.concurrency as u64)?;
        positive("resolve.country_target", self.resolve.country_target as u64)?;
        positive("resolve.city_limit", self.resolve.city_limit as u64)?;
        Ok(())
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            primary_count: self.upstream.primary_count,
            supplementary_count: self.upstream.supplementary_count,
            primary_timeout: Duration::from_millis(self.upstream.primary_timeout_ms),
            supplementary_timeout: Duration::from_millis(self.upstream.supplementary_timeout_ms),
            budget: Duration::from_millis(self.resolve.budget_ms),
            cache_capacity: self.cache.capacity,
            cache_ttl: Duration::from_secs(self.cache.ttl_secs),
            augment: AugmentOptions {
                target: self.resolve.country_target,
                max_static_lookups: self.resolve.max_static_lookups,
                concurrency: self.resolve.concurrency,
                min_population: self.resolve.min_population,
            },
            limits: RankLimits {
                country: self.resolve.country_target,
                city: self.resolve.city_limit,
            },
        }
    }
}
