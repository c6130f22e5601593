use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::TryStreamExt;
use tiberius::{ColumnData, FromSql, Query};

use super::client::MssqlClient;
use crate::error::SqlAdapterError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Map a tiberius failure; a broken socket means the connection is gone.
pub(crate) fn mssql_error(err: tiberius::error::Error) -> SqlAdapterError {
    if matches!(err, tiberius::error::Error::Io { .. }) {
        SqlAdapterError::ConnectionLost(err.to_string())
    } else {
        SqlAdapterError::MssqlError(err)
    }
}

/// Bind parameters directly to the query for SQL Server.
pub(crate) fn bind_query_params<'a>(query: &'a str, params: &[RowValues]) -> Query<'a> {
    let mut query_builder = Query::new(query);

    for param in params {
        match param {
            RowValues::Int(i) => query_builder.bind(*i),
            RowValues::Float(f) => query_builder.bind(*f),
            RowValues::Text(s) => query_builder.bind(s.clone()),
            RowValues::Bool(b) => query_builder.bind(*b),
            RowValues::Timestamp(dt) => query_builder.bind(*dt),
            RowValues::Null => query_builder.bind(Option::<String>::None),
            RowValues::Blob(bytes) => query_builder.bind(bytes.clone()),
            // Composite values are normally turned into JSON text by the dialect already.
            other => query_builder.bind(other.to_json().to_string()),
        }
    }

    query_builder
}

/// Run `query` and collect its first result into a `ResultSet`.
///
/// # Errors
/// Returns execution or decoding errors.
pub(crate) async fn build_result_set(
    client: &mut MssqlClient,
    query: &str,
    params: &[RowValues],
) -> Result<ResultSet, SqlAdapterError> {
    let mut stream = bind_query_params(query, params)
        .query(client)
        .await
        .map_err(mssql_error)?;

    let column_names: Vec<String> = stream
        .columns()
        .await
        .map_err(mssql_error)?
        .map(|columns| columns.iter().map(|col| col.name().to_string()).collect())
        .unwrap_or_default();

    let mut result_set = ResultSet::new(column_names);
    let mut rows_stream = stream.into_row_stream();
    while let Some(row) = rows_stream.try_next().await.map_err(mssql_error)? {
        let values = row
            .into_iter()
            .map(extract_value)
            .collect::<Result<Vec<_>, _>>()?;
        result_set.push_row(values);
    }

    Ok(result_set)
}

fn decode<'a, T: FromSql<'a>>(data: &'a ColumnData<'static>) -> Result<Option<T>, SqlAdapterError> {
    T::from_sql(data).map_err(SqlAdapterError::MssqlError)
}

/// Convert one column of a tiberius row.
fn extract_value(data: ColumnData<'static>) -> Result<RowValues, SqlAdapterError> {
    let value = match &data {
        ColumnData::U8(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(RowValues::Int),
        ColumnData::F32(v) => v.map(|v| RowValues::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(RowValues::Float),
        ColumnData::Bit(v) => v.map(RowValues::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| RowValues::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| RowValues::Text(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| RowValues::Blob(b.to_vec())),
        ColumnData::Numeric(v) => match v {
            Some(n) => Some(n.to_string().parse::<f64>().map(RowValues::Float).map_err(|e| {
                SqlAdapterError::ExecutionError(format!("unreadable numeric value {n}: {e}"))
            })?),
            None => None,
        },
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            decode::<NaiveDateTime>(&data)?.map(RowValues::Timestamp)
        }
        ColumnData::Date(_) => decode::<NaiveDate>(&data)?
            .map(|d| RowValues::Timestamp(d.and_time(NaiveTime::MIN))),
        ColumnData::Time(_) => decode::<NaiveTime>(&data)?.map(|t| RowValues::Text(t.to_string())),
        ColumnData::DateTimeOffset(_) => decode::<DateTime<Utc>>(&data)?
            .map(|dt| RowValues::Timestamp(dt.naive_utc())),
        other => {
            return Err(SqlAdapterError::ExecutionError(format!(
                "unsupported SQL Server column value: {other:?}"
            )));
        }
    };
    Ok(value.unwrap_or(RowValues::Null))
}
