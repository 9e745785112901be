//! # pg-transfer
//!
//! One-shot, re-runnable PostgreSQL to PostgreSQL data migration.
//!
//! This library copies an application's tables from a source database to a
//! destination database that already carries the same schema:
//!
//! - **Registry order**: parents before children, checked at startup
//! - **Idempotent loads**: rows already present count as migrated, so a
//!   failed run can simply be repeated
//! - **Row-level containment**: a rejected row is recorded, the run goes on
//! - **Validation**: live row counts on both sides after the migration
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_transfer::{Config, Orchestrator, RunOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> pg_transfer::Result<()> {
//!     let config = Config::from_env()?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let report = orchestrator
//!         .run(RunOptions::default(), CancellationToken::new())
//!         .await;
//!     println!("{}", report.render_text());
//!     std::process::exit(report.exit_code() as i32);
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod validate;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, MigrationConfig, TableConfig};
pub use crate::core::{Batch, LoadOutcome, ReadOptions, Row, SourceReader, SqlValue, TargetWriter};
pub use error::{MigrateError, Result};
pub use extract::{extract, RowStream};
pub use load::Loader;
pub use orchestrator::{health_check, HealthCheckResult, Orchestrator, RunOptions};
pub use registry::{TableDescriptor, TableRegistry};
pub use report::{
    AbortRecord, ErrorRecord, MigrationPlan, MigrationResult, ReportKind, RunReport, RunStatus,
    ValidationResult,
};
pub use validate::{ValidationReport, Validator};
