//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable holding the source connection string.
pub const SOURCE_URL_ENV: &str = "SOURCE_DATABASE_URL";

/// Environment variable holding the destination connection string.
pub const DESTINATION_URL_ENV: &str = "DESTINATION_DATABASE_URL";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source database (read role is sufficient).
    #[serde(default)]
    pub source: DatabaseConfig,

    /// Destination database (read/write role required).
    #[serde(default)]
    pub destination: DatabaseConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Table descriptors replacing the built-in registry when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableConfig>,
}

/// Connection settings for one database.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string, URL (`postgres://...`) or key/value form.
    #[serde(default)]
    pub url: String,

    /// TLS mode: disable, prefer, require, verify-ca, verify-full.
    /// Derived from the connection string's `sslmode` when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<String>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &redact_url(&self.url))
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Upper bound for every read, write and count (default: 30).
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,

    /// Upper bound for establishing a connection (default: 10).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Rows fetched from the source per keyset page (default: 1000).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Concurrent row writers within one table (default: 1).
    #[serde(default = "default_row_workers")]
    pub row_workers: usize,

    /// Move serial/identity sequences past the migrated keys (default: true).
    #[serde(default = "default_true")]
    pub sync_sequences: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            statement_timeout_secs: default_statement_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            page_size: default_page_size(),
            row_workers: default_row_workers(),
            sync_sequences: true,
        }
    }
}

impl MigrationConfig {
    pub fn statement_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.statement_timeout_secs)
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs)
    }

    /// Budget for one row insert: acquiring a connection, then the statement.
    pub fn insert_timeout(&self) -> std::time::Duration {
        self.connect_timeout() + self.statement_timeout()
    }
}

/// One table descriptor as written in a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Identifier used in reports.
    pub name: String,

    /// Migration rank; parents must have a lower rank.
    pub order: u32,

    /// Schema holding the table (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// Physical table name (default: same as `name`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,

    /// Primary key columns (default: ["id"]).
    #[serde(default = "default_primary_key")]
    pub primary_key: Vec<String>,

    /// Names of the tables this table references.
    #[serde(default)]
    pub parents: Vec<String>,
}

/// Hide the password of a connection string for logs and Debug output.
pub fn redact_url(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let rest = &url[scheme_end + 3..];
        if let Some(at) = rest.rfind('@') {
            let userinfo = &rest[..at];
            if let Some(colon) = userinfo.find(':') {
                return format!(
                    "{}{}:[REDACTED]{}",
                    &url[..scheme_end + 3],
                    &userinfo[..colon],
                    &rest[at..]
                );
            }
        }
        return url.to_string();
    }

    url.split_whitespace()
        .map(|pair| {
            if pair.starts_with("password=") {
                "password=[REDACTED]".to_string()
            } else {
                pair.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// Default value functions for serde
fn default_statement_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_page_size() -> usize {
    1_000
}

fn default_row_workers() -> usize {
    1
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_primary_key() -> Vec<String> {
    vec!["id".to_string()]
}

fn default_true() -> bool {
    true
}
