//! Configuration validation.

use super::{Config, DatabaseConfig, DESTINATION_URL_ENV, SOURCE_URL_ENV};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Connection strings are checked before any I/O happens
    if config.source.url.trim().is_empty() {
        return Err(MigrateError::Config(format!(
            "{} is required (or source.url in the config file)",
            SOURCE_URL_ENV
        )));
    }
    if config.destination.url.trim().is_empty() {
        return Err(MigrateError::Config(format!(
            "{} is required (or destination.url in the config file)",
            DESTINATION_URL_ENV
        )));
    }

    let source = config.source.pg_config()?;
    let destination = config.destination.pg_config()?;
    config.source.effective_ssl_mode()?;
    config.destination.effective_ssl_mode()?;

    if source.get_hosts().is_empty() {
        return Err(MigrateError::Config("source connection string has no host".into()));
    }
    if destination.get_hosts().is_empty() {
        return Err(MigrateError::Config(
            "destination connection string has no host".into(),
        ));
    }

    // Cannot migrate onto the same database
    if same_database(&config.source, &config.destination)? {
        return Err(MigrateError::Config(
            "source and destination cannot be the same database".into(),
        ));
    }

    if config.migration.statement_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "migration.statement_timeout_secs must be at least 1".into(),
        ));
    }
    if config.migration.connect_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "migration.connect_timeout_secs must be at least 1".into(),
        ));
    }
    if config.migration.page_size == 0 {
        return Err(MigrateError::Config(
            "migration.page_size must be at least 1".into(),
        ));
    }
    if config.migration.row_workers == 0 {
        return Err(MigrateError::Config(
            "migration.row_workers must be at least 1".into(),
        ));
    }

    Ok(())
}

fn same_database(a: &DatabaseConfig, b: &DatabaseConfig) -> Result<bool> {
    let a = a.pg_config()?;
    let b = b.pg_config()?;

    Ok(a.get_hosts() == b.get_hosts()
        && effective_ports(&a) == effective_ports(&b)
        && a.get_dbname() == b.get_dbname())
}

fn effective_ports(config: &tokio_postgres::Config) -> Vec<u16> {
    if config.get_ports().is_empty() {
        vec![5432]
    } else {
        config.get_ports().to_vec()
    }
}
