//! Core abstractions shared by the pipeline stages.
//!
//! - [`value`]: SQL values, rows and batches, free of driver types
//! - [`traits`]: the reader and writer seams the orchestrator works against

pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use traits::{LoadOutcome, ReadOptions, SourceReader, TargetWriter};
pub use value::{Batch, Row, SqlValue};
