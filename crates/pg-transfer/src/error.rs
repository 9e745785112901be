//! Error types for the migration library.

use thiserror::Error;

/// Exit code for fatal errors (bad config, connection failure, aborted run).
pub const EXIT_FATAL: u8 = 2;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing URL, invalid YAML value, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Table registry failed its startup ordering check
    #[error("Table registry error: {0}")]
    Registry(String),

    /// Could not reach or keep a connection to one of the databases
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Reading a source table failed; the table cannot be migrated safely
    #[error("Extraction failed for table {table}: {message}")]
    Extraction { table: String, message: String },

    /// A database call did not finish within the configured timeout
    #[error("Timed out after {seconds}s while {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// Unclassified database error
    #[error("Database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an Extraction error
    pub fn extraction(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Extraction {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Timeout error
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        MigrateError::Timeout {
            operation: operation.into(),
            seconds: timeout.as_secs(),
        }
    }

    /// Process exit code for this error.
    ///
    /// Every error that escapes the library is fatal for the run.
    pub fn exit_code(&self) -> u8 {
        EXIT_FATAL
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
