//! Connection pool construction for source and destination databases.

use std::time::Duration;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio::time::timeout;
use tracing::{info, warn};

use super::tls::{SslMode, TlsBuilder};
use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};

/// Name reported to the server in `pg_stat_activity`.
const APPLICATION_NAME: &str = "pg-transfer";

/// Build a pool for `db` and prove it works with `SELECT 1`.
///
/// `role` ("source" / "destination") is only used in messages. The whole
/// handshake, including the test query, is bounded by `connect_timeout`.
pub async fn connect_pool(
    db: &DatabaseConfig,
    role: &str,
    max_size: usize,
    connect_timeout: Duration,
) -> Result<Pool> {
    let mut pg_config = db.pg_config()?;
    let ssl_mode = db.effective_ssl_mode()?;

    pg_config.connect_timeout(connect_timeout);
    pg_config.keepalives(true);
    pg_config.keepalives_idle(Duration::from_secs(30));
    if pg_config.get_application_name().is_none() {
        pg_config.application_name(APPLICATION_NAME);
    }
    pg_config.ssl_mode(match ssl_mode {
        SslMode::Disable => tokio_postgres::config::SslMode::Disable,
        SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
        _ => tokio_postgres::config::SslMode::Require,
    });

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let mgr = match TlsBuilder::new(ssl_mode).build()? {
        Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
        None => {
            warn!(
                "TLS is disabled for the {} database. Credentials will be transmitted in plaintext.",
                role
            );
            Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
        }
    };

    let pool = Pool::builder(mgr)
        .max_size(max_size.max(1))
        .build()
        .map_err(|e| MigrateError::connection(e, format!("creating {} pool", role)))?;

    // Test connection
    let ping = async {
        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(e, format!("connecting to {} database", role)))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, format!("testing {} connection", role)))?;
        Ok::<_, MigrateError>(())
    };
    timeout(connect_timeout, ping)
        .await
        .map_err(|_| MigrateError::timeout(format!("connecting to {} database", role), connect_timeout))??;

    info!("Connected to {} database: {}", role, db.redacted());
    Ok(pool)
}
