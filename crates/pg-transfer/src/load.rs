//! Idempotent row loading.
//!
//! A row that is already present at the destination counts as migrated, so
//! re-running the whole migration after a partial failure is safe.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

pub use crate::core::traits::LoadOutcome;
use crate::core::traits::TargetWriter;
use crate::core::value::Row;
use crate::error::Result;
use crate::registry::TableDescriptor;

/// Writes rows through a [`TargetWriter`], bounding every call by a timeout.
#[derive(Clone)]
pub struct Loader {
    writer: Arc<dyn TargetWriter>,
    timeout: Duration,
}

impl Loader {
    pub fn new(writer: Arc<dyn TargetWriter>, timeout: Duration) -> Self {
        Self { writer, timeout }
    }

    /// Insert one row.
    ///
    /// Exceeding the overall budget rejects the row. Errors from the writer,
    /// including its own connection-acquisition timeout, pass through as `Err`.
    pub async fn load(&self, table: &TableDescriptor, row: &Row) -> Result<LoadOutcome> {
        let outcome = match timeout(self.timeout, self.writer.insert_row(table, row)).await {
            Ok(result) => result?,
            Err(_) => LoadOutcome::Rejected(format!(
                "insert did not finish within {}s",
                self.timeout.as_secs()
            )),
        };

        match &outcome {
            LoadOutcome::Written => {}
            LoadOutcome::AlreadyExists => {
                debug!(
                    "{}: {} already present, skipping",
                    table.name,
                    row.identifier(&table.primary_key)
                );
            }
            LoadOutcome::Rejected(reason) => {
                warn!(
                    "{}: row {} rejected: {}",
                    table.name,
                    row.identifier(&table.primary_key),
                    reason
                );
            }
        }

        Ok(outcome)
    }
}
