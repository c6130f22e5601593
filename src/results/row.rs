use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::SqlAdapterError;
use crate::types::RowValues;

/// A row from a query result, sharing its column names with the rest of the result set.
#[derive(Debug, Clone)]
pub struct Row {
    column_names: Arc<Vec<String>>,
    values: Vec<RowValues>,
    column_index: Arc<HashMap<String, usize>>,
}

impl Row {
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<RowValues>) -> Self {
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            values,
            column_index,
        }
    }

    pub(crate) fn with_index(
        column_names: Arc<Vec<String>>,
        column_index: Arc<HashMap<String, usize>>,
        values: Vec<RowValues>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index,
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.values
    }

    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index.get(column_name) {
            return Some(idx);
        }
        // Drivers may report names in a different case than the caller uses.
        self.column_names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
    }

    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    /// Column name to JSON value, in column order.
    #[must_use]
    pub fn to_json_map(&self) -> JsonMap<String, JsonValue> {
        self.column_names
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }

    /// Decode the row into any `Deserialize` type, matching fields by column name.
    ///
    /// # Errors
    /// `ParameterError` when the row does not fit `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SqlAdapterError> {
        Ok(serde_json::from_value(JsonValue::Object(self.to_json_map()))?)
    }
}

pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        name: String,
        nickname: Option<String>,
    }

    fn row() -> Row {
        Row::new(
            Arc::new(vec!["id".into(), "name".into(), "nickname".into()]),
            vec![RowValues::Int(7), RowValues::Text("ada".into()), RowValues::Null],
        )
    }

    #[test]
    fn lookup_by_name_and_index() {
        let row = row();
        assert_eq!(row.get("name"), Some(&RowValues::Text("ada".into())));
        assert_eq!(row.get("NAME"), Some(&RowValues::Text("ada".into())));
        assert_eq!(row.get_by_index(0), Some(&RowValues::Int(7)));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn decodes_into_struct() {
        let user: User = row().decode().unwrap();
        assert_eq!(
            user,
            User {
                id: 7,
                name: "ada".into(),
                nickname: None
            }
        );
    }
}
