//! Core traits for the migration pipeline.
//!
//! - [`SourceReader`]: streams rows out of the source database
//! - [`TargetWriter`]: writes single rows into the destination database
//!
//! The orchestrator and validator only see these traits, so a real
//! PostgreSQL connection and an in-memory fake are interchangeable.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::registry::TableDescriptor;

use super::value::{Batch, Row};

/// Options for reading rows from a table.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Number of rows per page.
    pub page_size: usize,
    /// Upper bound on each page query.
    pub timeout: Duration,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            page_size: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of inserting one row.
///
/// Row-level problems are values, not errors: only a broken connection is
/// returned as `Err` from [`TargetWriter::insert_row`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The row was inserted.
    Written,
    /// A row with the same unique key was already present.
    AlreadyExists,
    /// The destination refused the row (constraint, type, timeout, ...).
    Rejected(String),
}

/// Read data from the source database.
///
/// # Streaming
///
/// [`read_table`](SourceReader::read_table) returns a channel receiver. The
/// reader spawns a background task that fills the channel page by page, so a
/// slow destination applies backpressure instead of buffering the table.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Start streaming rows of `table`, ordered by its primary key.
    ///
    /// The final batch has `is_last` set. An `Err` item ends the stream.
    fn read_table(&self, table: &TableDescriptor, opts: ReadOptions)
        -> mpsc::Receiver<Result<Batch>>;

    /// Count the rows of a table.
    async fn row_count(&self, table: &TableDescriptor) -> Result<i64>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Label used in logs (e.g. "postgres").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Write rows into the destination database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Insert one row, classifying the result.
    ///
    /// Returns `Err` only when the destination is unreachable.
    async fn insert_row(&self, table: &TableDescriptor, row: &Row) -> Result<LoadOutcome>;

    /// Count the rows of a table.
    async fn row_count(&self, table: &TableDescriptor) -> Result<i64>;

    /// Move the table's serial sequence past the highest key.
    ///
    /// Returns `false` when the key is not backed by a sequence.
    async fn sync_sequence(&self, table: &TableDescriptor) -> Result<bool>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Label used in logs (e.g. "postgres").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}
