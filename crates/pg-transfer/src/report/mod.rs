//! Run report: immutable result values and their rendering.
//!
//! The orchestrator and validator only build values; formatting happens
//! once, at the end, as text or JSON.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::traits::LoadOutcome;
use crate::error::{Result, EXIT_FATAL};

/// Exit code when rows were rejected or counts disagree.
pub const EXIT_PARTIAL: u8 = 1;

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every table completed without a rejected row, and every count matched.
    Success,
    /// Every table completed, but rows were rejected or counts disagree.
    Partial,
    /// The run stopped early (fatal error or cancellation).
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Which phases a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    /// Migration, optionally followed by validation.
    Run,
    /// Standalone validation.
    Validate,
}

/// One row the destination refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub table_name: String,
    /// Primary key rendering, e.g. `id=42`.
    pub row_identifier: String,
    pub message: String,
}

/// Per-table migration outcome.
///
/// `rows_read == rows_written + already_present + errors.len()` holds at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub table_name: String,
    /// Rows the loader finished with.
    pub rows_read: u64,
    /// Rows inserted by this run.
    pub rows_written: u64,
    /// Rows found already migrated (unique conflict).
    pub already_present: u64,
    pub errors: Vec<ErrorRecord>,
    pub duration_ms: u64,
}

impl MigrationResult {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            rows_read: 0,
            rows_written: 0,
            already_present: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Account for one loaded row.
    pub fn record(&mut self, row_identifier: String, outcome: LoadOutcome) {
        self.rows_read += 1;
        match outcome {
            LoadOutcome::Written => self.rows_written += 1,
            LoadOutcome::AlreadyExists => self.already_present += 1,
            LoadOutcome::Rejected(message) => self.errors.push(ErrorRecord {
                table_name: self.table_name.clone(),
                row_identifier,
                message,
            }),
        }
    }

    /// Rows now present at the destination.
    pub fn rows_migrated(&self) -> u64 {
        self.rows_written + self.already_present
    }
}

/// Row counts of one table on both sides.
///
/// A table whose counts could not be taken has `error` set and never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub table_name: String,
    pub source_count: Option<i64>,
    pub destination_count: Option<i64>,
    pub matches: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn new(table_name: impl Into<String>, source_count: i64, destination_count: i64) -> Self {
        Self {
            table_name: table_name.into(),
            source_count: Some(source_count),
            destination_count: Some(destination_count),
            matches: source_count == destination_count,
            error: None,
        }
    }

    /// A table that could not be counted.
    pub fn failed(table_name: impl Into<String>, error: impl ToString) -> Self {
        Self {
            table_name: table_name.into(),
            source_count: None,
            destination_count: None,
            matches: false,
            error: Some(error.to_string()),
        }
    }
}

/// Why and where a run stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortRecord {
    /// Table in progress, if any.
    pub table_name: Option<String>,
    pub message: String,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub kind: ReportKind,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Completed tables in registry order; `None` for standalone validation.
    pub migration: Option<Vec<MigrationResult>>,
    /// Counts in registry order; `None` when validation did not run.
    pub validation: Option<Vec<ValidationResult>>,
    pub abort: Option<AbortRecord>,
}

impl RunReport {
    /// Assemble a report, deriving the status from its contents.
    pub fn new(
        kind: ReportKind,
        started_at: DateTime<Utc>,
        migration: Option<Vec<MigrationResult>>,
        validation: Option<Vec<ValidationResult>>,
        abort: Option<AbortRecord>,
    ) -> Self {
        let has_errors = migration
            .iter()
            .flatten()
            .any(|m| !m.errors.is_empty());
        let has_mismatch = validation.iter().flatten().any(|v| !v.matches);

        let status = if abort.is_some() {
            RunStatus::Failed
        } else if has_errors || has_mismatch {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            kind,
            status,
            started_at,
            finished_at: Utc::now(),
            migration,
            validation,
            abort,
        }
    }

    /// Keep the identifier logged when the run started.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// All error records, in table order.
    pub fn errors(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.migration.iter().flatten().flat_map(|m| m.errors.iter())
    }

    /// Process exit code: 0 clean, 1 rejected rows or mismatches, 2 fatal.
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Failed => EXIT_FATAL,
            RunStatus::Partial => EXIT_PARTIAL,
            RunStatus::Success => 0,
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable report.
    pub fn render_text(&self) -> String {
        self.to_string()
    }

    fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

const RULE_WIDTH: usize = 72;

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);

        if let Some(ref migration) = self.migration {
            writeln!(f, "MIGRATION")?;
            writeln!(f, "{}", rule)?;
            writeln!(
                f,
                "{:<24} {:>10} {:>10} {:>10} {:>8}",
                "table", "read", "written", "present", "errors"
            )?;
            for m in migration {
                writeln!(
                    f,
                    "{:<24} {:>10} {:>10} {:>10} {:>8}",
                    m.table_name,
                    m.rows_read,
                    m.rows_written,
                    m.already_present,
                    m.errors.len()
                )?;
            }
            if migration.is_empty() {
                writeln!(f, "(no table completed)")?;
            }

            let read: u64 = migration.iter().map(|m| m.rows_read).sum();
            let migrated: u64 = migration.iter().map(MigrationResult::rows_migrated).sum();
            let rate = if read > 0 {
                migrated as f64 * 100.0 / read as f64
            } else {
                100.0
            };
            writeln!(
                f,
                "{} tables, {} rows read, {} migrated ({:.1}%)",
                migration.len(),
                read,
                migrated,
                rate
            )?;

            let errors: Vec<&ErrorRecord> = self.errors().collect();
            if !errors.is_empty() {
                writeln!(f)?;
                writeln!(f, "REJECTED ROWS")?;
                for e in errors {
                    writeln!(f, "  {} [{}]: {}", e.table_name, e.row_identifier, e.message)?;
                }
            }
            writeln!(f)?;
        }

        if let Some(ref validation) = self.validation {
            writeln!(f, "VALIDATION")?;
            writeln!(f, "{}", rule)?;
            writeln!(
                f,
                "{:<24} {:>10} {:>12} {:>8}",
                "table", "source", "destination", "match"
            )?;
            for v in validation {
                let verdict = match (v.source_count, v.destination_count) {
                    _ if v.matches => "yes".to_string(),
                    (Some(src), Some(dst)) => format!("DIFF {:+}", dst - src),
                    _ => "ERROR".to_string(),
                };
                writeln!(
                    f,
                    "{:<24} {:>10} {:>12} {:>8}",
                    v.table_name,
                    count_cell(v.source_count),
                    count_cell(v.destination_count),
                    verdict
                )?;
                if let Some(ref error) = v.error {
                    writeln!(f, "  {}: {}", v.table_name, error)?;
                }
            }
            let mismatched = validation.iter().filter(|v| !v.matches).count();
            writeln!(
                f,
                "{} tables checked, {} mismatched",
                validation.len(),
                mismatched
            )?;
            writeln!(f)?;
        }

        if let Some(ref abort) = self.abort {
            match abort.table_name {
                Some(ref table) => writeln!(f, "ABORTED at {}: {}", table, abort.message)?,
                None => writeln!(f, "ABORTED: {}", abort.message)?,
            }
        }

        writeln!(
            f,
            "status: {} | run {} | {:.1}s | exit {}",
            self.status,
            self.run_id,
            self.duration_secs(),
            self.exit_code()
        )
    }
}

fn count_cell(count: Option<i64>) -> String {
    count.map_or_else(|| "-".to_string(), |n| n.to_string())
}

/// One entry of a dry-run plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTable {
    pub table_name: String,
    pub order: u32,
    /// Physical, schema-qualified relation.
    pub relation: String,
    pub parents: Vec<String>,
    /// Source row count; `None` when the plan was built without a connection.
    pub source_rows: Option<i64>,
}

/// Tables in the order they would be migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub tables: Vec<PlannedTable>,
}

impl MigrationPlan {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Sum of known source counts.
    pub fn total_rows(&self) -> i64 {
        self.tables.iter().filter_map(|t| t.source_rows).sum()
    }
}

impl fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PLAN")?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        for (idx, t) in self.tables.iter().enumerate() {
            let rows = t
                .source_rows
                .map(|n| format!("{} rows", n))
                .unwrap_or_default();
            let after = if t.parents.is_empty() {
                String::new()
            } else {
                format!("after {}", t.parents.join(", "))
            };
            writeln!(
                f,
                "[{:>2}/{}] {:<24} order {:<3} {:<28} {:>12} {}",
                idx + 1,
                self.tables.len(),
                t.table_name,
                t.order,
                t.relation,
                rows,
                after
            )?;
        }
        if self.tables.iter().any(|t| t.source_rows.is_some()) {
            writeln!(f, "{} rows to migrate", self.total_rows())?;
        }
        Ok(())
    }
}
