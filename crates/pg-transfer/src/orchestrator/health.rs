//! Connectivity check for both databases, each checked independently.

use std::fmt;
use std::future::Future;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Config, DatabaseConfig};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::drivers::{PostgresReader, PostgresWriter};
use crate::error::{Result, EXIT_FATAL};

/// Result of probing one database.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    pub role: String,
    /// Connection string with the password hidden.
    pub url: String,
    pub reachable: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Result of probing both databases.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub source: EndpointHealth,
    pub destination: EndpointHealth,
}

impl HealthCheckResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn exit_code(&self) -> u8 {
        if self.healthy {
            0
        } else {
            EXIT_FATAL
        }
    }
}

impl fmt::Display for EndpointHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error {
            None => write!(f, "{:<12} ok     {:>6}ms  {}", self.role, self.latency_ms, self.url),
            Some(ref e) => write!(f, "{:<12} FAILED {:>6}ms  {}\n             {}", self.role, self.latency_ms, self.url, e),
        }
    }
}

impl fmt::Display for HealthCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.source)?;
        writeln!(f, "{}", self.destination)?;
        writeln!(
            f,
            "health check {}",
            if self.healthy { "passed" } else { "failed" }
        )
    }
}

/// Connect to each database and round-trip `SELECT 1`.
///
/// A failing source does not prevent the destination from being checked.
pub async fn health_check(config: &Config) -> HealthCheckResult {
    let m = &config.migration;

    let source = check_endpoint("source", &config.source, async {
        let reader =
            PostgresReader::new(&config.source, m.connect_timeout(), m.statement_timeout()).await?;
        let result = reader.ping().await;
        reader.close().await;
        result
    })
    .await;

    let destination = check_endpoint("destination", &config.destination, async {
        let writer = PostgresWriter::new(
            &config.destination,
            1,
            m.connect_timeout(),
            m.statement_timeout(),
        )
        .await?;
        let result = writer.ping().await;
        writer.close().await;
        result
    })
    .await;

    HealthCheckResult {
        healthy: source.reachable && destination.reachable,
        source,
        destination,
    }
}

async fn check_endpoint<F>(role: &str, db: &DatabaseConfig, check: F) -> EndpointHealth
where
    F: Future<Output = Result<()>>,
{
    let start = Instant::now();
    let outcome = check.await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(()) => {
            info!("{} database reachable ({}ms)", role, latency_ms);
            EndpointHealth {
                role: role.to_string(),
                url: db.redacted(),
                reachable: true,
                latency_ms,
                error: None,
            }
        }
        Err(e) => {
            warn!("{} database unreachable: {}", role, e);
            EndpointHealth {
                role: role.to_string(),
                url: db.redacted(),
                reachable: false,
                latency_ms,
                error: Some(e.to_string()),
            }
        }
    }
}
