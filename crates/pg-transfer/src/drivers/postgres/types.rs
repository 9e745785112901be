//! Conversion between PostgreSQL wire values and [`SqlValue`].
//!
//! Common types are decoded into typed variants. Everything else (Prisma
//! enums, inet, intervals, arrays of non-text types, ...) is carried in its
//! binary wire form and written back unchanged, which is lossless because
//! source and destination share the schema.

use std::error::Error;
use std::sync::Arc;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use uuid::Uuid;

use crate::core::value::{Row, SqlValue};

type BoxError = Box<dyn Error + Sync + Send>;

/// Undecoded column value.
struct RawValue(Vec<u8>);

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(RawValue(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql_checked(ty, out),
            SqlValue::I16(v) => v.to_sql_checked(ty, out),
            SqlValue::I32(v) => v.to_sql_checked(ty, out),
            SqlValue::I64(v) => v.to_sql_checked(ty, out),
            SqlValue::F32(v) => v.to_sql_checked(ty, out),
            SqlValue::F64(v) => v.to_sql_checked(ty, out),
            SqlValue::Numeric(v) => v.to_sql_checked(ty, out),
            SqlValue::Text(v) => v.to_sql_checked(ty, out),
            SqlValue::Bytes(v) => v.to_sql_checked(ty, out),
            SqlValue::Uuid(v) => v.to_sql_checked(ty, out),
            SqlValue::Json(v) => v.to_sql_checked(ty, out),
            SqlValue::Timestamp(v) => v.to_sql_checked(ty, out),
            SqlValue::TimestampTz(v) => v.to_sql_checked(ty, out),
            SqlValue::Date(v) => v.to_sql_checked(ty, out),
            SqlValue::Time(v) => v.to_sql_checked(ty, out),
            SqlValue::TextArray(v) => v.to_sql_checked(ty, out),
            SqlValue::Other { bytes, .. } => {
                out.extend_from_slice(bytes);
                Ok(IsNull::No)
            }
        }
    }

    // Typed variants check their own compatibility in to_sql_checked
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Decode every column of a result row.
pub(crate) fn decode_row(
    row: &tokio_postgres::Row,
    columns: &Arc<[String]>,
) -> Result<Row, tokio_postgres::Error> {
    let values = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| decode_value(row, idx, col.type_()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Row::new(Arc::clone(columns), values))
}

/// Column names of a result set, shared by all rows of a page.
pub(crate) fn column_names(row: &tokio_postgres::Row) -> Arc<[String]> {
    row.columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>()
        .into()
}

fn decode_value(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
) -> Result<SqlValue, tokio_postgres::Error> {
    let typed = match *ty {
        Type::BOOL => typed::<bool>(row, idx, SqlValue::Bool),
        Type::INT2 => typed::<i16>(row, idx, SqlValue::I16),
        Type::INT4 => typed::<i32>(row, idx, SqlValue::I32),
        Type::INT8 => typed::<i64>(row, idx, SqlValue::I64),
        Type::FLOAT4 => typed::<f32>(row, idx, SqlValue::F32),
        Type::FLOAT8 => typed::<f64>(row, idx, SqlValue::F64),
        Type::NUMERIC => typed::<Decimal>(row, idx, SqlValue::Numeric),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            typed::<String>(row, idx, SqlValue::Text)
        }
        Type::BYTEA => typed::<Vec<u8>>(row, idx, SqlValue::Bytes),
        Type::UUID => typed::<Uuid>(row, idx, SqlValue::Uuid),
        Type::JSON | Type::JSONB => typed::<serde_json::Value>(row, idx, SqlValue::Json),
        Type::TIMESTAMP => typed::<NaiveDateTime>(row, idx, SqlValue::Timestamp),
        Type::TIMESTAMPTZ => typed::<DateTime<Utc>>(row, idx, SqlValue::TimestampTz),
        Type::DATE => typed::<NaiveDate>(row, idx, SqlValue::Date),
        Type::TIME => typed::<NaiveTime>(row, idx, SqlValue::Time),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => {
            typed::<Vec<Option<String>>>(row, idx, SqlValue::TextArray)
        }
        _ => None,
    };

    match typed {
        Some(value) => Ok(value),
        // NaN numerics, infinite timestamps and unknown types stay in wire form
        None => raw(row, idx, ty),
    }
}

fn typed<'a, T>(row: &'a tokio_postgres::Row, idx: usize, wrap: fn(T) -> SqlValue) -> Option<SqlValue>
where
    T: FromSql<'a>,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => Some(wrap(v)),
        Ok(None) => Some(SqlValue::Null),
        Err(_) => None,
    }
}

fn raw(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<SqlValue, tokio_postgres::Error> {
    Ok(match row.try_get::<_, Option<RawValue>>(idx)? {
        Some(RawValue(bytes)) => SqlValue::Other {
            type_name: ty.name().to_string(),
            bytes,
        },
        None => SqlValue::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &SqlValue, ty: &Type) -> Result<(IsNull, Vec<u8>), BoxError> {
        let mut buf = BytesMut::new();
        let is_null = value.to_sql_checked(ty, &mut buf)?;
        Ok((is_null, buf.to_vec()))
    }

    #[test]
    fn test_null_encodes_as_null_for_any_type() {
        let (is_null, bytes) = encode(&SqlValue::Null, &Type::INT4).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_typed_values_use_driver_encoding() {
        let (_, bytes) = encode(&SqlValue::I32(42), &Type::INT4).unwrap();
        assert_eq!(bytes, 42i32.to_be_bytes());

        let (_, bytes) = encode(&SqlValue::Text("hello".into()), &Type::VARCHAR).unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_wrong_type_is_an_encode_error() {
        assert!(encode(&SqlValue::Bool(true), &Type::INT8).is_err());
    }

    #[test]
    fn test_other_passes_wire_bytes_through() {
        let value = SqlValue::Other {
            type_name: "Role".into(),
            bytes: b"ADMIN".to_vec(),
        };
        let (is_null, bytes) = encode(&value, &Type::UNKNOWN).unwrap();
        assert!(matches!(is_null, IsNull::No));
        assert_eq!(bytes, b"ADMIN");
    }

    #[test]
    fn test_raw_value_accepts_everything() {
        assert!(<RawValue as FromSql>::accepts(&Type::INET));
        let raw = RawValue::from_sql(&Type::INET, &[2, 32, 0, 4]).unwrap();
        assert_eq!(raw.0, vec![2, 32, 0, 4]);
    }
}
