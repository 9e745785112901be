//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};
use crate::registry::{TableDescriptor, TableRegistry};
use std::path::Path;
use tokio_postgres::Config as PgConfig;

impl Config {
    /// Build configuration from `SOURCE_DATABASE_URL` and `DESTINATION_DATABASE_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a YAML file, letting the environment override the URLs.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file and apply environment overrides without validating.
    ///
    /// Enough for commands that never connect, such as printing the plan.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse configuration from a YAML string (no environment overrides).
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(SOURCE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.source.url = url;
        }
        if let Some(url) = lookup(DESTINATION_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.destination.url = url;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Build the table registry: the configured tables, or the built-in set.
    pub fn registry(&self) -> Result<TableRegistry> {
        if self.tables.is_empty() {
            return TableRegistry::builtin();
        }

        let descriptors = self
            .tables
            .iter()
            .map(|t| {
                TableDescriptor::new(
                    &t.name,
                    t.order,
                    t.relation.as_deref().unwrap_or(&t.name),
                )
                .in_schema(&t.schema)
                .with_primary_key(t.primary_key.iter().map(String::as_str))
                .with_parents(t.parents.iter().map(String::as_str))
            })
            .collect();

        TableRegistry::new(descriptors)
    }
}

impl DatabaseConfig {
    /// Parse the connection string into a tokio-postgres config.
    ///
    /// ORM-only query parameters (`pgbouncer`, `connection_limit`, ...) are
    /// dropped, and `sslmode=verify-*` is handed to the TLS layer.
    pub fn pg_config(&self) -> Result<PgConfig> {
        let (url, _) = normalize_url(&self.url);
        url.parse::<PgConfig>().map_err(|e| {
            MigrateError::Config(format!(
                "invalid connection string '{}': {}",
                redact_url(&self.url),
                e
            ))
        })
    }

    /// Effective TLS mode: explicit setting, else the connection string's `sslmode`.
    pub fn effective_ssl_mode(&self) -> Result<SslMode> {
        if let Some(ref mode) = self.ssl_mode {
            return SslMode::parse(mode);
        }
        if let (_, Some(verify)) = normalize_url(&self.url) {
            return SslMode::parse(&verify);
        }

        let mode = match self.pg_config()?.get_ssl_mode() {
            tokio_postgres::config::SslMode::Disable => SslMode::Disable,
            tokio_postgres::config::SslMode::Prefer => SslMode::Prefer,
            _ => SslMode::Require,
        };
        Ok(mode)
    }

    /// Connection string with the password hidden.
    pub fn redacted(&self) -> String {
        redact_url(&self.url)
    }
}

/// Query parameters understood by ORMs and poolers but not by libpq.
const FOREIGN_URL_PARAMS: &[&str] = &[
    "pgbouncer",
    "connection_limit",
    "pool_timeout",
    "schema",
    "statement_cache_size",
    "socket_timeout",
];

/// Strip parameters tokio-postgres rejects, returning a `verify-*` sslmode separately.
fn normalize_url(url: &str) -> (String, Option<String>) {
    let Some((base, query)) = url.split_once('?') else {
        return (url.to_string(), None);
    };
    if !base.contains("://") {
        return (url.to_string(), None);
    }

    let mut verify = None;
    let mut kept = Vec::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if FOREIGN_URL_PARAMS.contains(&key) {
            continue;
        }
        if key == "sslmode" && value.starts_with("verify-") {
            verify = Some(value.to_string());
            kept.push("sslmode=require".to_string());
            continue;
        }
        kept.push(pair.to_string());
    }

    if kept.is_empty() {
        (base.to_string(), verify)
    } else {
        (format!("{}?{}", base, kept.join("&")), verify)
    }
}
