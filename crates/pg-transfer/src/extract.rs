//! Row extraction: turns a reader's page channel into a lazy row sequence.

use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::traits::{ReadOptions, SourceReader};
use crate::core::value::{Batch, Row};
use crate::error::{MigrateError, Result};
use crate::registry::TableDescriptor;

/// Start reading `table` and return its rows in primary-key order.
///
/// Nothing is fetched beyond the reader's small page buffer until rows are pulled.
pub fn extract(reader: &dyn SourceReader, table: &TableDescriptor, opts: ReadOptions) -> RowStream {
    // The reader bounds each query itself; this catches a reader that went silent
    let recv_timeout = opts.timeout.saturating_mul(2);
    let rx = reader.read_table(table, opts);
    RowStream::new(&table.name, rx, recv_timeout)
}

/// Lazy sequence of rows from one table.
pub struct RowStream {
    table: String,
    rx: mpsc::Receiver<Result<Batch>>,
    pending: std::vec::IntoIter<Row>,
    finished: bool,
    recv_timeout: Duration,
}

impl RowStream {
    fn new(table: &str, rx: mpsc::Receiver<Result<Batch>>, recv_timeout: Duration) -> Self {
        Self {
            table: table.to_string(),
            rx,
            pending: Vec::new().into_iter(),
            finished: false,
            recv_timeout,
        }
    }

    /// Next row, `Ok(None)` once the table is exhausted.
    ///
    /// After an error the stream is finished.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.pending.next() {
                return Ok(Some(row));
            }
            if self.finished {
                return Ok(None);
            }

            match self.next_batch().await {
                Ok(batch) => {
                    self.finished = batch.is_last;
                    self.pending = batch.rows.into_iter();
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            }
        }
    }

    async fn next_batch(&mut self) -> Result<Batch> {
        match timeout(self.recv_timeout, self.rx.recv()).await {
            Err(_) => Err(MigrateError::timeout(
                format!("waiting for rows of {}", self.table),
                self.recv_timeout,
            )),
            Ok(None) => Err(MigrateError::extraction(
                &self.table,
                "reader stopped before the final page",
            )),
            Ok(Some(batch)) => batch,
        }
    }

    /// Adapt into a `Stream`, checking `cancel` before each row is handed out.
    ///
    /// Cancellation surfaces as a single `Err(MigrateError::Cancelled)` item.
    pub fn into_stream(self, cancel: CancellationToken) -> impl Stream<Item = Result<Row>> {
        stream::unfold(Some(self), move |state| {
            let cancel = cancel.clone();
            async move {
                let mut rows = state?;
                if cancel.is_cancelled() {
                    return Some((Err(MigrateError::Cancelled), None));
                }
                match rows.next_row().await {
                    Ok(Some(row)) => Some((Ok(row), Some(rows))),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), None)),
                }
            }
        })
    }
}
