use std::error::Error;

use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::types::RowValues;

/// Borrow converted arguments as the `&[&(dyn ToSql + Sync)]` slice tokio-postgres expects.
pub(crate) fn as_refs(params: &[RowValues]) -> Vec<&(dyn ToSql + Sync)> {
    let mut references = Vec::with_capacity(params.len());
    for p in params {
        references.push(p as &(dyn ToSql + Sync));
    }
    references
}

fn narrow<T: TryFrom<i64>>(value: i64, ty: &Type) -> Result<T, Box<dyn Error + Sync + Send>> {
    T::try_from(value).map_err(|_| format!("integer {value} does not fit column type {ty}").into())
}

impl ToSql for RowValues {
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            RowValues::Int(i) => match *ty {
                Type::INT2 => narrow::<i16>(*i, ty)?.to_sql(ty, out),
                Type::INT4 => narrow::<i32>(*i, ty)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ => (*i).to_sql(ty, out),
            },
            RowValues::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => (*f).to_sql(ty, out),
            },
            RowValues::Text(s) => s.to_sql(ty, out),
            RowValues::Bool(b) => (*b).to_sql(ty, out),
            RowValues::Timestamp(dt) => match *ty {
                Type::DATE => dt.date().to_sql(ty, out),
                Type::TIMESTAMPTZ => dt.and_utc().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            RowValues::Null => Ok(IsNull::Yes),
            RowValues::JSON(jsval) => jsval.to_sql(ty, out),
            RowValues::Map(map) => serde_json::Value::Object(map.clone()).to_sql(ty, out),
            RowValues::Blob(bytes) => bytes.to_sql(ty, out),
            RowValues::IntArray(values) => match *ty {
                Type::INT4_ARRAY => values
                    .iter()
                    .map(|v| narrow::<i32>(*v, ty))
                    .collect::<Result<Vec<_>, _>>()?
                    .to_sql(ty, out),
                _ => values.to_sql(ty, out),
            },
            RowValues::FloatArray(values) => values.to_sql(ty, out),
            RowValues::TextArray(values) => values.to_sql(ty, out),
            RowValues::BoolArray(values) => values.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::UNKNOWN
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
                | Type::INT4_ARRAY
                | Type::INT8_ARRAY
                | Type::FLOAT8_ARRAY
                | Type::TEXT_ARRAY
                | Type::VARCHAR_ARRAY
                | Type::BOOL_ARRAY
        )
    }

    to_sql_checked!();
}
