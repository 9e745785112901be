//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL text for paging, inserts, counts and sequences
//! - [`PostgresReader`]: source reader
//! - [`PostgresWriter`]: destination writer

mod dialect;
mod reader;
mod types;
mod writer;

pub use dialect::PostgresDialect;
pub use reader::PostgresReader;
pub use writer::PostgresWriter;
