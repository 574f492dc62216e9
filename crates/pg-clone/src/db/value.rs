//! Pass-through SQL values.
//!
//! Rows are carried between the two databases as [`SqlValue`] tuples:
//! fetched typed from the source, bound as statement parameters on the
//! destination, never transformed in between.

use bytes::BytesMut;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};
use tokio_postgres::Row;

/// A single column value in transit.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Decimal(rust_decimal::Decimal),
    Timestamp(chrono::NaiveDateTime),
    TimestampTz(chrono::DateTime<chrono::FixedOffset>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Json(serde_json::Value),
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::I16(v) => v.to_sql(ty, out),
            SqlValue::I32(v) => v.to_sql(ty, out),
            SqlValue::I64(v) => v.to_sql(ty, out),
            SqlValue::F32(v) => v.to_sql(ty, out),
            SqlValue::F64(v) => v.to_sql(ty, out),
            SqlValue::Text(v) => v.to_sql(ty, out),
            SqlValue::Bytes(v) => v.to_sql(ty, out),
            SqlValue::Uuid(v) => v.to_sql(ty, out),
            SqlValue::Decimal(v) => v.to_sql(ty, out),
            SqlValue::Timestamp(v) => v.to_sql(ty, out),
            SqlValue::TimestampTz(v) => v.to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Time(v) => v.to_sql(ty, out),
            SqlValue::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // The insert statement's column types decide; a mismatched variant
        // fails in to_sql with the driver's own error.
        true
    }

    fn to_sql_checked(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        self.to_sql(ty, out)
    }
}

/// Convert a fetched row into pass-through values, driven by the column
/// types the server reported.
pub(crate) fn from_row(row: &Row) -> Vec<SqlValue> {
    (0..row.columns().len())
        .map(|idx| from_column(row, idx))
        .collect()
}

fn from_column(row: &Row, idx: usize) -> SqlValue {
    let ty = row.columns()[idx].type_();

    match ty.name() {
        "bool" => get(row, idx, SqlValue::Bool),
        "int2" => get(row, idx, SqlValue::I16),
        "int4" => get(row, idx, SqlValue::I32),
        "int8" => get(row, idx, SqlValue::I64),
        "float4" => get(row, idx, SqlValue::F32),
        "float8" => get(row, idx, SqlValue::F64),
        "bytea" => get(row, idx, SqlValue::Bytes),
        "uuid" => get(row, idx, SqlValue::Uuid),
        "numeric" => get(row, idx, SqlValue::Decimal),
        "timestamp" => get(row, idx, SqlValue::Timestamp),
        "timestamptz" => get(row, idx, SqlValue::TimestampTz),
        "date" => get(row, idx, SqlValue::Date),
        "time" => get(row, idx, SqlValue::Time),
        "json" | "jsonb" => get(row, idx, SqlValue::Json),
        // text, varchar, bpchar, name, and anything else with a textual
        // representation the driver will hand over as a String.
        _ => get(row, idx, SqlValue::Text),
    }
}

fn get<'a, T, F>(row: &'a Row, idx: usize, wrap: F) -> SqlValue
where
    T: FromSql<'a>,
    F: FnOnce(T) -> SqlValue,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => wrap(v),
        Ok(None) => SqlValue::Null,
        Err(_) => SqlValue::Null,
    }
}
