//! Database driver implementations.
//!
//! - [`postgres`]: PostgreSQL reader and writer
//! - [`common`]: shared utilities (TLS, pool construction)

pub mod common;
pub mod postgres;

// Re-export common utilities
pub use common::{SslMode, TlsBuilder};

pub use postgres::{PostgresReader, PostgresWriter};
