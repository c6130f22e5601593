use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tokio_postgres::Row as PgRow;
use tokio_postgres::types::Type;

use crate::error::SqlAdapterError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Build a result set from rows, taking column names from `columns` so that empty results keep
/// their shape.
///
/// # Errors
/// Returns errors from row value extraction.
pub(crate) fn build_result_set(
    columns: &[tokio_postgres::Column],
    rows: &[PgRow],
) -> Result<ResultSet, SqlAdapterError> {
    let column_names: Vec<String> = columns.iter().map(|col| col.name().to_string()).collect();
    let column_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(column_names, rows.len());
    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.push_row(row_values);
    }
    Ok(result_set)
}

/// Extracts a `RowValues` from a `tokio_postgres` row at the given index.
///
/// # Errors
/// Returns `SqlAdapterError` if the column cannot be decoded.
pub(crate) fn postgres_extract_value(
    row: &PgRow,
    idx: usize,
) -> Result<RowValues, SqlAdapterError> {
    let type_info = row.columns()[idx].type_();

    let value = match *type_info {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(RowValues::Int),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| RowValues::Float(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(RowValues::Float),
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(RowValues::Bool),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(RowValues::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| RowValues::Timestamp(v.naive_utc())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| RowValues::Timestamp(v.and_time(chrono::NaiveTime::MIN))),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?.map(RowValues::JSON),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(RowValues::Blob),
        Type::INT4_ARRAY => row
            .try_get::<_, Option<Vec<i32>>>(idx)?
            .map(|v| RowValues::IntArray(v.into_iter().map(i64::from).collect())),
        Type::INT8_ARRAY => row
            .try_get::<_, Option<Vec<i64>>>(idx)?
            .map(RowValues::IntArray),
        Type::FLOAT8_ARRAY => row
            .try_get::<_, Option<Vec<f64>>>(idx)?
            .map(RowValues::FloatArray),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => row
            .try_get::<_, Option<Vec<String>>>(idx)?
            .map(RowValues::TextArray),
        Type::BOOL_ARRAY => row
            .try_get::<_, Option<Vec<bool>>>(idx)?
            .map(RowValues::BoolArray),
        // For other types, attempt to get as string
        _ => row.try_get::<_, Option<String>>(idx)?.map(RowValues::Text),
    };
    Ok(value.unwrap_or(RowValues::Null))
}
