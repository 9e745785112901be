//! SQL value and row types for database-agnostic data transfer.
//!
//! Rows travel from the source reader to the destination writer without any
//! driver types attached, so fakes and real connections are interchangeable.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL of any type.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (integer/serial).
    I32(i32),

    /// 64-bit signed integer (bigint/bigserial).
    I64(i64),

    /// 32-bit floating point (real).
    F32(f32),

    /// 64-bit floating point (double precision).
    F64(f64),

    /// Exact numeric.
    Numeric(Decimal),

    /// Text, varchar, char, name.
    Text(String),

    /// Binary data (bytea).
    Bytes(Vec<u8>),

    /// UUID value.
    Uuid(Uuid),

    /// json or jsonb document.
    Json(serde_json::Value),

    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),

    /// Timestamp with time zone, normalized to UTC.
    TimestampTz(DateTime<Utc>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),

    /// One-dimensional text[] / varchar[].
    TextArray(Vec<Option<String>>),

    /// Any other type (enums, inet, intervals, ...) carried in its binary wire form.
    Other { type_name: String, bytes: Vec<u8> },
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::I16(v) => write!(f, "{}", v),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F32(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Numeric(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Json(v) => write!(f, "{}", v),
            SqlValue::Timestamp(v) => write!(f, "{}", v),
            SqlValue::TimestampTz(v) => write!(f, "{}", v.to_rfc3339()),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::Time(v) => write!(f, "{}", v),
            SqlValue::TextArray(v) => write!(f, "<{} elements>", v.len()),
            SqlValue::Other { type_name, bytes } => {
                // Enum labels travel as UTF-8 text
                match std::str::from_utf8(bytes) {
                    Ok(text) if !text.is_empty() && !text.contains('\0') => write!(f, "{}", text),
                    _ => write!(f, "<{}>", type_name),
                }
            }
        }
    }
}

/// One row: column names shared across a page, values in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row. `values` must line up with `columns`.
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, SqlValue)>,
        S: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<SqlValue>) =
            pairs.into_iter().map(|(c, v)| (c.into(), v)).unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Look up a value by column name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Human-readable key for error records, e.g. `id=42` or `identifier=a, token=b`.
    pub fn identifier(&self, key_columns: &[String]) -> String {
        let parts: Vec<String> = key_columns
            .iter()
            .map(|col| match self.get(col) {
                Some(value) => format!("{}={}", col, value),
                None => format!("{}=?", col),
            })
            .collect();

        if parts.is_empty() {
            "<no key>".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Values of the given key columns, in order.
    pub fn key_values(&self, key_columns: &[String]) -> Option<Vec<SqlValue>> {
        key_columns
            .iter()
            .map(|col| self.get(col).cloned())
            .collect()
    }
}

/// Batch of rows flowing from a reader to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Rows in this batch (owned for channel transfer).
    pub rows: Vec<Row>,

    /// Whether this is the final batch for the table.
    pub is_last: bool,
}

impl Batch {
    /// Create a new batch with the given rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            is_last: false,
        }
    }

    /// Create an empty final batch.
    pub fn empty_final() -> Self {
        Self {
            rows: Vec::new(),
            is_last: true,
        }
    }

    /// Mark this as the final batch.
    pub fn mark_final(mut self) -> Self {
        self.is_last = true;
        self
    }

    /// Get the number of rows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
