//! Common utilities shared by the source and destination drivers.
//!
//! - [`tls`]: TLS configuration for PostgreSQL connections
//! - [`pool`]: pool construction with connect timeouts

pub mod pool;
pub mod tls;

pub use pool::connect_pool;
pub use tls::{SslMode, TlsBuilder};
