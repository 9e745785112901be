//! Migration orchestrator - main workflow coordinator.
//!
//! Tables are migrated strictly one after another in registry order, so a
//! child table never sees rows whose parents have not been written yet.
//! Within a table, up to `row_workers` inserts may be in flight.

mod health;

pub use health::{health_check, EndpointHealth, HealthCheckResult};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::traits::{ReadOptions, SourceReader, TargetWriter};
use crate::drivers::{PostgresReader, PostgresWriter};
use crate::error::{MigrateError, Result};
use crate::extract::extract;
use crate::load::Loader;
use crate::registry::{TableDescriptor, TableRegistry};
use crate::report::{
    AbortRecord, MigrationPlan, MigrationResult, PlannedTable, ReportKind, RunReport,
};
use crate::validate::Validator;

/// Rows between progress log lines.
const PROGRESS_INTERVAL: u64 = 10_000;

/// Options for a migration run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Do not re-count tables after migrating.
    pub skip_validation: bool,
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    registry: TableRegistry,
    source: Arc<dyn SourceReader>,
    destination: Arc<dyn TargetWriter>,
    loader: Loader,
}

impl Orchestrator {
    /// Check the registry, then connect to both databases.
    pub async fn new(config: Config) -> Result<Self> {
        let registry = config.registry()?;
        let m = &config.migration;

        let source =
            PostgresReader::new(&config.source, m.connect_timeout(), m.statement_timeout()).await?;
        let destination = PostgresWriter::new(
            &config.destination,
            m.row_workers,
            m.connect_timeout(),
            m.statement_timeout(),
        )
        .await?;

        Ok(Self::with_connections(
            config,
            registry,
            Arc::new(source),
            Arc::new(destination),
        ))
    }

    /// Build an orchestrator over existing connections.
    pub fn with_connections(
        config: Config,
        registry: TableRegistry,
        source: Arc<dyn SourceReader>,
        destination: Arc<dyn TargetWriter>,
    ) -> Self {
        let loader = Loader::new(destination.clone(), config.migration.insert_timeout());
        Self {
            config,
            registry,
            source,
            destination,
            loader,
        }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    /// Migrate every table, then validate unless skipped or aborted.
    ///
    /// Always returns a report; fatal problems end up in its `abort` record.
    pub async fn run(&self, options: RunOptions, cancel: CancellationToken) -> RunReport {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Starting migration run {} ({} tables, {} -> {})",
            run_id,
            self.registry.len(),
            self.source.db_type(),
            self.destination.db_type()
        );

        let (migration, abort) = self.migrate(&cancel).await;

        if abort.is_none() && self.config.migration.sync_sequences {
            self.sync_sequences(&migration).await;
        }

        let (validation, abort) = if abort.is_some() {
            info!("Skipping validation: migration did not complete");
            (None, abort)
        } else if options.skip_validation {
            info!("Skipping validation (--skip-validation)");
            (None, None)
        } else {
            info!("Validating row counts");
            let report = self.validator().validate(&self.registry, &cancel).await;
            (Some(report.results), report.abort)
        };

        let report = RunReport::new(ReportKind::Run, started_at, Some(migration), validation, abort)
            .with_run_id(run_id);

        info!(
            "Migration {}: {} tables, {} rows in {:.1}s",
            report.status,
            report.migration.as_ref().map_or(0, Vec::len),
            report
                .migration
                .iter()
                .flatten()
                .map(|m| m.rows_read)
                .sum::<u64>(),
            (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0
        );

        report
    }

    /// Migrate tables in registry order.
    ///
    /// Returns the completed tables and, if the run stopped early, why.
    pub async fn migrate(
        &self,
        cancel: &CancellationToken,
    ) -> (Vec<MigrationResult>, Option<AbortRecord>) {
        let total = self.registry.len();
        let mut results = Vec::with_capacity(total);

        for (idx, table) in self.registry.all_descriptors().iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Cancellation requested, not starting {}", table.name);
                return (
                    results,
                    Some(AbortRecord {
                        table_name: None,
                        message: MigrateError::Cancelled.to_string(),
                    }),
                );
            }

            info!("[{}/{}] Migrating {} ({})", idx + 1, total, table.name, table.full_name());

            match self.migrate_table(table, cancel).await {
                Ok(result) => {
                    info!(
                        "{}: completed ({} read, {} written, {} already present, {} rejected, {}ms)",
                        table.name,
                        result.rows_read,
                        result.rows_written,
                        result.already_present,
                        result.errors.len(),
                        result.duration_ms
                    );
                    results.push(result);
                }
                Err(e) => {
                    error!("{}: aborting run - {}", table.name, e);
                    return (
                        results,
                        Some(AbortRecord {
                            table_name: Some(table.name.clone()),
                            message: e.to_string(),
                        }),
                    );
                }
            }
        }

        (results, None)
    }

    async fn migrate_table(
        &self,
        table: &TableDescriptor,
        cancel: &CancellationToken,
    ) -> Result<MigrationResult> {
        let start = Instant::now();
        let mut result = MigrationResult::new(&table.name);
        let loader = &self.loader;

        let rows = extract(self.source.as_ref(), table, self.read_options())
            .into_stream(cancel.clone());

        let outcomes = rows
            .map(|item| async move {
                let row = item?;
                let identifier = row.identifier(&table.primary_key);
                let outcome = loader.load(table, &row).await?;
                Ok::<_, MigrateError>((identifier, outcome))
            })
            .buffer_unordered(self.config.migration.row_workers.max(1));
        tokio::pin!(outcomes);

        while let Some(item) = outcomes.next().await {
            let (identifier, outcome) = match item {
                Ok(done) => done,
                Err(e) => {
                    warn!("{}: stopped after {} rows", table.name, result.rows_read);
                    return Err(e);
                }
            };

            result.record(identifier, outcome);
            if result.rows_read % PROGRESS_INTERVAL == 0 {
                info!("{}: {} rows processed", table.name, result.rows_read);
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Move destination sequences past the migrated keys. Failures only warn.
    async fn sync_sequences(&self, migrated: &[MigrationResult]) {
        let statement_timeout = self.statement_timeout();

        for result in migrated {
            let Some(table) = self.registry.get(&result.table_name) else {
                continue;
            };
            if !table.has_single_pk() {
                continue;
            }

            match timeout(statement_timeout, self.destination.sync_sequence(table)).await {
                Ok(Ok(true)) => debug!("{}: sequence synchronized", table.name),
                Ok(Ok(false)) => debug!("{}: no sequence to synchronize", table.name),
                Ok(Err(e)) => warn!("{}: failed to synchronize sequence: {}", table.name, e),
                Err(_) => warn!(
                    "{}: sequence synchronization timed out after {}s",
                    table.name,
                    statement_timeout.as_secs()
                ),
            }
        }
    }

    /// Count rows on both sides without migrating.
    pub async fn validate(&self, cancel: CancellationToken) -> RunReport {
        let started_at = Utc::now();
        info!("Validating {} tables", self.registry.len());

        let report = self.validator().validate(&self.registry, &cancel).await;
        RunReport::new(
            ReportKind::Validate,
            started_at,
            None,
            Some(report.results),
            report.abort,
        )
    }

    /// Migration plan with live source row counts. Writes nothing.
    pub async fn plan(&self) -> Result<MigrationPlan> {
        let statement_timeout = self.statement_timeout();
        let mut plan = registry_plan(&self.registry);

        for (planned, table) in plan.tables.iter_mut().zip(self.registry.all_descriptors()) {
            let count = timeout(statement_timeout, self.source.row_count(table))
                .await
                .map_err(|_| {
                    MigrateError::timeout(
                        format!("counting source rows of {}", table.name),
                        statement_timeout,
                    )
                })??;
            planned.source_rows = Some(count);
        }

        Ok(plan)
    }

    /// Close both connection pools.
    pub async fn close(&self) {
        self.source.close().await;
        self.destination.close().await;
    }

    fn validator(&self) -> Validator {
        Validator::new(
            self.source.clone(),
            self.destination.clone(),
            self.statement_timeout(),
        )
    }

    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            page_size: self.config.migration.page_size,
            timeout: self.statement_timeout(),
        }
    }

    fn statement_timeout(&self) -> Duration {
        self.config.migration.statement_timeout()
    }
}

/// Registry order as a plan, without row counts.
pub fn registry_plan(registry: &TableRegistry) -> MigrationPlan {
    MigrationPlan {
        tables: registry
            .all_descriptors()
            .iter()
            .map(|d| PlannedTable {
                table_name: d.name.clone(),
                order: d.order,
                relation: d.full_name(),
                parents: d.parents.clone(),
                source_rows: None,
            })
            .collect(),
    }
}
