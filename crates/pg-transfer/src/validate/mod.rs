//! Row-count reconciliation between source and destination.
//!
//! Counts are always taken live from both databases, never derived from a
//! migration result, so validation can run on its own at any time.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::traits::{SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::registry::{TableDescriptor, TableRegistry};
use crate::report::{AbortRecord, ValidationResult};

/// Validation outcome: results gathered in registry order, plus why it stopped early.
///
/// Only cancellation stops validation; a table that cannot be counted is
/// recorded as a failed result and the next table is checked.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub results: Vec<ValidationResult>,
    pub abort: Option<AbortRecord>,
}

/// Counts every registered table on both connections.
pub struct Validator {
    source: Arc<dyn SourceReader>,
    destination: Arc<dyn TargetWriter>,
    timeout: Duration,
}

impl Validator {
    pub fn new(
        source: Arc<dyn SourceReader>,
        destination: Arc<dyn TargetWriter>,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            destination,
            timeout,
        }
    }

    /// Compare row counts table by table.
    pub async fn validate(
        &self,
        registry: &TableRegistry,
        cancel: &CancellationToken,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        for table in registry.all_descriptors() {
            if cancel.is_cancelled() {
                report.abort = Some(AbortRecord {
                    table_name: Some(table.name.clone()),
                    message: MigrateError::Cancelled.to_string(),
                });
                break;
            }

            match self.validate_table(table).await {
                Ok(result) => report.results.push(result),
                Err(e) => {
                    warn!("{}: could not count rows: {}", table.name, e);
                    report.results.push(ValidationResult::failed(&table.name, e));
                }
            }
        }

        report
    }

    async fn validate_table(&self, table: &TableDescriptor) -> Result<ValidationResult> {
        let source_count = timeout(self.timeout, self.source.row_count(table))
            .await
            .map_err(|_| {
                MigrateError::timeout(format!("counting source rows of {}", table.name), self.timeout)
            })??;
        let destination_count = timeout(self.timeout, self.destination.row_count(table))
            .await
            .map_err(|_| {
                MigrateError::timeout(
                    format!("counting destination rows of {}", table.name),
                    self.timeout,
                )
            })??;

        let result = ValidationResult::new(&table.name, source_count, destination_count);
        if result.matches {
            info!("{}: {} rows (match)", table.name, source_count);
        } else {
            warn!(
                "{}: source={} destination={} (MISMATCH)",
                table.name, source_count, destination_count
            );
        }

        Ok(result)
    }
}
