//! PostgreSQL destination writer.
//!
//! Rows are inserted one at a time with a plain `INSERT`. The outcome is
//! classified from the driver's typed error: SQLSTATE 23505 means the row is
//! already there, any other server-side error rejects just this row, and a
//! lost connection is fatal for the run.
//!
//! Acquiring a connection is bounded by the connect timeout and failing to
//! get one is fatal; only the statement itself is bounded by the statement
//! timeout.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio::time::timeout;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tracing::debug;

use super::dialect::PostgresDialect;
use crate::config::DatabaseConfig;
use crate::core::traits::{LoadOutcome, TargetWriter};
use crate::core::value::Row;
use crate::drivers::common::connect_pool;
use crate::error::{MigrateError, Result};
use crate::registry::TableDescriptor;

/// PostgreSQL target writer implementation.
pub struct PostgresWriter {
    pool: Pool,
    dialect: PostgresDialect,
    connect_timeout: Duration,
    statement_timeout: Duration,
}

impl PostgresWriter {
    /// Connect to the destination database with up to `max_conns` connections.
    pub async fn new(
        db: &DatabaseConfig,
        max_conns: usize,
        connect_timeout: Duration,
        statement_timeout: Duration,
    ) -> Result<Self> {
        let pool = connect_pool(db, "destination", max_conns, connect_timeout).await?;
        Ok(Self {
            pool,
            dialect: PostgresDialect::new(),
            connect_timeout,
            statement_timeout,
        })
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        timeout(self.connect_timeout, self.pool.get())
            .await
            .map_err(|_| MigrateError::timeout(context, self.connect_timeout))?
            .map_err(|e| MigrateError::connection(e, context))
    }
}

#[async_trait]
impl TargetWriter for PostgresWriter {
    async fn insert_row(&self, table: &TableDescriptor, row: &Row) -> Result<LoadOutcome> {
        let client = self.client(&format!("writing to {}", table.name)).await?;

        let sql = self.dialect.insert_query(table, row.columns());
        let params: Vec<&(dyn ToSql + Sync)> = row
            .values()
            .iter()
            .map(|v| v as &(dyn ToSql + Sync))
            .collect();

        let insert = async {
            let stmt = client.prepare_cached(&sql).await?;
            client.execute(&stmt, &params).await
        };

        match timeout(self.statement_timeout, insert).await {
            Ok(Ok(_)) => Ok(LoadOutcome::Written),
            Ok(Err(e)) => classify_write_error(e, table),
            Err(_) => Ok(LoadOutcome::Rejected(format!(
                "insert did not finish within {}s",
                self.statement_timeout.as_secs()
            ))),
        }
    }

    async fn row_count(&self, table: &TableDescriptor) -> Result<i64> {
        let context = format!("counting destination rows of {}", table.name);
        let client = self.client(&context).await?;
        let sql = self.dialect.count_query(table);

        let row = timeout(self.statement_timeout, client.query_one(&sql, &[]))
            .await
            .map_err(|_| MigrateError::timeout(&context, self.statement_timeout))??;
        Ok(row.get::<_, i64>(0))
    }

    async fn sync_sequence(&self, table: &TableDescriptor) -> Result<bool> {
        if !table.has_single_pk() {
            return Ok(false);
        }

        let context = format!("syncing sequence of {}", table.name);
        let client = self.client(&context).await?;

        let work = async {
            let row = client
                .query_one(
                    self.dialect.serial_sequence_query(),
                    &[&table.qualified_name(), &table.primary_key[0]],
                )
                .await?;
            let Some(sequence) = row.get::<_, Option<String>>(0) else {
                return Ok(false);
            };

            client
                .query_one(&self.dialect.setval_query(table), &[&sequence])
                .await?;
            debug!("Reset sequence {} for {}", sequence, table.full_name());
            Ok::<_, tokio_postgres::Error>(true)
        };

        Ok(timeout(self.statement_timeout, work)
            .await
            .map_err(|_| MigrateError::timeout(&context, self.statement_timeout))??)
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client("pinging destination database").await?;
        timeout(self.statement_timeout, client.simple_query("SELECT 1"))
            .await
            .map_err(|_| {
                MigrateError::timeout("pinging destination database", self.statement_timeout)
            })?
            .map_err(|e| MigrateError::connection(e, "pinging destination database"))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// How a failed INSERT affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteFailure {
    /// Unique violation: the row was migrated before.
    AlreadyExists,
    /// The server or the encoder refused this row only.
    Rejected,
    /// The destination is gone; nothing further can be written.
    Fatal,
}

/// Decide from the typed SQLSTATE and the transport state, never from message text.
fn classify(code: Option<&SqlState>, is_closed: bool, has_io_source: bool) -> WriteFailure {
    match code {
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => WriteFailure::AlreadyExists,
        // Class 08 (connection exception) and 57P (operator intervention) end the session
        Some(code) if code.code().starts_with("08") || code.code().starts_with("57P") => {
            WriteFailure::Fatal
        }
        Some(_) => WriteFailure::Rejected,
        None if is_closed || has_io_source => WriteFailure::Fatal,
        None => WriteFailure::Rejected,
    }
}

/// Map a failed INSERT to a row outcome, or to a fatal error if the connection is gone.
fn classify_write_error(e: tokio_postgres::Error, table: &TableDescriptor) -> Result<LoadOutcome> {
    let has_io_source = std::error::Error::source(&e).is_some_and(|s| s.is::<std::io::Error>());

    match classify(e.code(), e.is_closed(), has_io_source) {
        WriteFailure::AlreadyExists => Ok(LoadOutcome::AlreadyExists),
        WriteFailure::Fatal => Err(MigrateError::connection(
            e,
            format!("writing to {}", table.full_name()),
        )),
        WriteFailure::Rejected => {
            let reason = match e.as_db_error() {
                Some(db) => {
                    let mut reason = format!("{} (SQLSTATE {})", db.message(), db.code().code());
                    if let Some(detail) = db.detail() {
                        reason.push_str(": ");
                        reason.push_str(detail);
                    }
                    reason
                }
                // Client-side failures (e.g. a value the column type cannot take)
                None => e.to_string(),
            };
            Ok(LoadOutcome::Rejected(reason))
        }
    }
}
