//! PostgreSQL source reader.
//!
//! Reads each table with keyset pagination on its primary key, one page per
//! query, so no long-lived cursor or transaction is held open against the
//! source.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_postgres::types::ToSql;
use tracing::debug;

use super::dialect::PostgresDialect;
use super::types::{column_names, decode_row};
use crate::config::DatabaseConfig;
use crate::core::traits::{ReadOptions, SourceReader};
use crate::core::value::{Batch, SqlValue};
use crate::drivers::common::connect_pool;
use crate::error::{MigrateError, Result};
use crate::registry::TableDescriptor;

/// Pages buffered between the reader task and the consumer.
const CHANNEL_DEPTH: usize = 2;

/// PostgreSQL source reader implementation.
pub struct PostgresReader {
    pool: Pool,
    dialect: PostgresDialect,
    connect_timeout: Duration,
    statement_timeout: Duration,
}

impl PostgresReader {
    /// Connect to the source database.
    ///
    /// Rows are read strictly one table at a time, so a single connection suffices.
    pub async fn new(
        db: &DatabaseConfig,
        connect_timeout: Duration,
        statement_timeout: Duration,
    ) -> Result<Self> {
        let pool = connect_pool(db, "source", 1, connect_timeout).await?;
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
impl SourceReader for PostgresReader {
    fn read_table(
        &self,
        table: &TableDescriptor,
        opts: ReadOptions,
    ) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let pool = self.pool.clone();
        let dialect = self.dialect.clone();
        let table = table.clone();

        tokio::spawn(async move {
            if let Err(e) = read_table_internal(pool, dialect, &table, opts, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn row_count(&self, table: &TableDescriptor) -> Result<i64> {
        let context = format!("counting source rows of {}", table.name);
        let client = self.client(&context).await?;
        let sql = self.dialect.count_query(table);

        let row = timeout(self.statement_timeout, client.query_one(&sql, &[]))
            .await
            .map_err(|_| MigrateError::timeout(&context, self.statement_timeout))??;
        Ok(row.get::<_, i64>(0))
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client("pinging source database").await?;
        timeout(self.statement_timeout, client.simple_query("SELECT 1"))
            .await
            .map_err(|_| MigrateError::timeout("pinging source database", self.statement_timeout))?
            .map_err(|e| MigrateError::connection(e, "pinging source database"))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

async fn read_table_internal(
    pool: Pool,
    dialect: PostgresDialect,
    table: &TableDescriptor,
    opts: ReadOptions,
    tx: mpsc::Sender<Result<Batch>>,
) -> Result<()> {
    let client = timeout(opts.timeout, pool.get())
        .await
        .map_err(|_| {
            MigrateError::timeout(format!("acquiring source connection for {}", table.name), opts.timeout)
        })?
        .map_err(|e| MigrateError::connection(e, format!("reading {}", table.name)))?;

    let first_sql = dialect.first_page_query(table, opts.page_size);
    let next_sql = dialect.next_page_query(table, opts.page_size);
    let mut last_key: Option<Vec<SqlValue>> = None;
    let mut page = 0usize;

    loop {
        let query = async {
            match &last_key {
                None => client.query(first_sql.as_str(), &[]).await,
                Some(key) => {
                    let params: Vec<&(dyn ToSql + Sync)> =
                        key.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
                    client.query(next_sql.as_str(), &params).await
                }
            }
        };

        let rows = timeout(opts.timeout, query)
            .await
            .map_err(|_| {
                MigrateError::timeout(format!("reading page {} of {}", page, table.name), opts.timeout)
            })?
            .map_err(|e| MigrateError::extraction(&table.name, e))?;

        if rows.is_empty() {
            let _ = tx.send(Ok(Batch::empty_final())).await;
            return Ok(());
        }

        let columns = column_names(&rows[0]);
        let batch_rows = rows
            .iter()
            .map(|r| decode_row(r, &columns))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MigrateError::extraction(&table.name, e))?;

        let is_last = batch_rows.len() < opts.page_size;
        if !is_last {
            let key = batch_rows
                .last()
                .and_then(|r| r.key_values(&table.primary_key))
                .ok_or_else(|| {
                    MigrateError::extraction(
                        &table.name,
                        format!("primary key columns {:?} not in result set", table.primary_key),
                    )
                })?;
            last_key = Some(key);
        }

        debug!("{}: page {} read ({} rows)", table.name, page, batch_rows.len());
        page += 1;

        let mut batch = Batch::new(batch_rows);
        if is_last {
            batch = batch.mark_final();
        }

        // Receiver dropped means the consumer stopped (cancellation or abort)
        if tx.send(Ok(batch)).await.is_err() || is_last {
            return Ok(());
        }
    }
}
