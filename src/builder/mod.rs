//! Fluent builders that produce a [`Query`]: a statement fragment plus its arguments in the
//! order their `?` markers appear in the compiled text.
//!
//! ```rust
//! use sql_adapter::prelude::*;
//!
//! let query = SelectBuilder::new("users")
//!     .columns(["id", "name"])
//!     .filter(Cond::eq("active", true).and(Cond::gt("age", 17)))
//!     .order_by("-created_at")
//!     .limit(20)
//!     .build()
//!     .unwrap();
//! assert_eq!(query.args, vec![RowValues::Bool(true), RowValues::Int(17)]);
//! ```

use serde::Serialize;

use crate::error::SqlAdapterError;
use crate::fragment::Statement;
use crate::types::RowValues;

mod cond;
mod dml;
mod select;

pub use cond::Cond;
pub use dml::{DeleteBuilder, InsertBuilder, UpdateBuilder};
pub use select::SelectBuilder;

/// A statement ready for compilation, with its positional arguments.
#[derive(Debug, Clone)]
pub struct Query {
    pub statement: Statement,
    pub args: Vec<RowValues>,
}

impl Query {
    #[must_use]
    pub fn new(statement: Statement, args: Vec<RowValues>) -> Self {
        Self { statement, args }
    }
}

impl From<Statement> for Query {
    fn from(statement: Statement) -> Self {
        Self::new(statement, Vec::new())
    }
}

/// Column/value pairs for inserts and updates, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, RowValues)>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chainable [`Record::insert`].
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.insert(column, value);
        self
    }

    /// Set `column`, replacing any earlier value for it.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<RowValues>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column, value)),
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&RowValues> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &RowValues> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, Vec<RowValues>) {
        self.fields.into_iter().unzip()
    }

    /// Build a record from any serializable struct or map.
    ///
    /// # Errors
    /// `ParameterError` if `value` does not serialize to a JSON object.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, SqlAdapterError> {
        match serde_json::to_value(value)? {
            serde_json::Value::Object(map) => Ok(Self {
                fields: map
                    .into_iter()
                    .map(|(column, value)| (column, RowValues::from_json(value)))
                    .collect(),
            }),
            other => Err(SqlAdapterError::ParameterError(format!(
                "expected an object to build a record, got {other}"
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<RowValues>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct NewUser<'a> {
        name: &'a str,
        age: i64,
        nickname: Option<&'a str>,
    }

    #[test]
    fn record_from_struct() {
        let record = Record::from_serialize(&NewUser {
            name: "ada",
            age: 36,
            nickname: None,
        })
        .unwrap();
        assert_eq!(record.get("name"), Some(&RowValues::Text("ada".into())));
        assert_eq!(record.get("age"), Some(&RowValues::Int(36)));
        assert_eq!(record.get("nickname"), Some(&RowValues::Null));
    }

    #[test]
    fn scalars_do_not_make_records() {
        assert!(matches!(
            Record::from_serialize(&5),
            Err(SqlAdapterError::ParameterError(_))
        ));
    }

    #[test]
    fn insert_replaces_in_place() {
        let record = Record::new().set("a", 1).set("b", 2).set("a", 3);
        let (columns, values) = record.into_parts();
        assert_eq!(columns, vec!["a", "b"]);
        assert_eq!(values, vec![RowValues::Int(3), RowValues::Int(2)]);
    }
}
