use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Values that can be stored in a database row or used as statement arguments.
///
/// Composite variants (arrays, maps) are normalized by each dialect's
/// [`ValueConverter`](crate::adapter::ValueConverter) before they reach a driver:
/// ```rust
/// use sql_adapter::prelude::*;
///
/// let args = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::TextArray(vec!["admin".into(), "ops".into()]),
/// ];
/// # let _ = args;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    TextArray(Vec<String>),
    BoolArray(Vec<bool>),
    /// String-keyed map, stored as JSON by backends that have no native map type
    Map(JsonMap<String, JsonValue>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// JSON view of the value, used when decoding rows into caller types.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Text(s) => JsonValue::String(s.clone()),
            RowValues::Bool(b) => JsonValue::Bool(*b),
            RowValues::Timestamp(dt) => {
                JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(v) => v.clone(),
            RowValues::Blob(bytes) => {
                JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect())
            }
            RowValues::IntArray(v) => JsonValue::from(v.clone()),
            RowValues::FloatArray(v) => JsonValue::from(v.clone()),
            RowValues::TextArray(v) => JsonValue::from(v.clone()),
            RowValues::BoolArray(v) => JsonValue::from(v.clone()),
            RowValues::Map(m) => JsonValue::Object(m.clone()),
        }
    }

    /// Map a JSON value onto the closest variant. Nested arrays and objects stay JSON unless
    /// they are homogeneous scalar arrays.
    #[must_use]
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => RowValues::Null,
            JsonValue::Bool(b) => RowValues::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => RowValues::Int(i),
                None => n.as_f64().map_or(RowValues::Null, RowValues::Float),
            },
            JsonValue::String(s) => RowValues::Text(s),
            JsonValue::Object(map) => RowValues::Map(map),
            JsonValue::Array(items) => scalar_array(&items).unwrap_or(RowValues::JSON(JsonValue::Array(items))),
        }
    }
}

fn scalar_array(items: &[JsonValue]) -> Option<RowValues> {
    if items.is_empty() {
        return None;
    }
    if let Some(ints) = items.iter().map(JsonValue::as_i64).collect::<Option<Vec<_>>>() {
        return Some(RowValues::IntArray(ints));
    }
    if let Some(floats) = items.iter().map(JsonValue::as_f64).collect::<Option<Vec<_>>>() {
        return Some(RowValues::FloatArray(floats));
    }
    if let Some(texts) = items
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
    {
        return Some(RowValues::TextArray(texts));
    }
    items
        .iter()
        .map(JsonValue::as_bool)
        .collect::<Option<Vec<_>>>()
        .map(RowValues::BoolArray)
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// The database products with a bundled dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    Postgres,
    /// SQL Server database
    Mssql,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_arrays_become_typed_arrays() {
        assert_eq!(
            RowValues::from_json(json!([1, 2, 3])),
            RowValues::IntArray(vec![1, 2, 3])
        );
        assert_eq!(
            RowValues::from_json(json!(["a", "b"])),
            RowValues::TextArray(vec!["a".into(), "b".into()])
        );
        assert!(matches!(
            RowValues::from_json(json!([1, "mixed"])),
            RowValues::JSON(_)
        ));
    }

    #[test]
    fn int_reads_as_bool() {
        assert_eq!(RowValues::Int(1).as_bool(), Some(&true));
        assert_eq!(RowValues::Int(7).as_bool(), None);
    }

    #[test]
    fn option_converts_to_null() {
        let missing: Option<i64> = None;
        assert!(RowValues::from(missing).is_null());
        assert_eq!(RowValues::from(Some("x")), RowValues::Text("x".into()));
    }
}
